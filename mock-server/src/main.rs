use mock_server::Credentials;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let defaults = Credentials::default();
    let credentials = Credentials {
        username: std::env::var("MOCK_USERNAME").unwrap_or(defaults.username),
        security_code_1: std::env::var("MOCK_SECURITY_CODE_1").unwrap_or(defaults.security_code_1),
        security_code_2: std::env::var("MOCK_SECURITY_CODE_2").unwrap_or(defaults.security_code_2),
    };

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    mock_server::run(listener, credentials).await
}
