use switchboard::config::ServerConfig;
use switchboard::signaling::SignalingServer;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let bind_addr = format!("0.0.0.0:{}", config.port);

    println!("   Switchboard Signaling Server");
    println!("   Binding to {}", bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::new(config);
    server.run(&bind_addr).await
}
