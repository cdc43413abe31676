use std::env;

use clap::Parser;

#[tokio::main]
async fn main() {
    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = avcto::api::run_http_server(port).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let cli = avcto::api::Cli::parse();
    if let Err(msg) = avcto::api::run_cli(&cli) {
        eprintln!("Error: {msg}");
        std::process::exit(2);
    }
}
