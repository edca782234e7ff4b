use clap::Parser;
use purple_auth::cli::{
    Args, build_config, handle_create_admin, init_logging, load_token_settings, open_database,
};
use purple_auth::jwt::TokenSettings;
use purple_auth::run_server;
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // SAFETY: no runtime has been built yet, so this is the only thread.
    let tokens = match unsafe { load_token_settings(&args) } {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "Invalid token configuration");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(args, tokens));
}

async fn serve(args: Args, tokens: TokenSettings) {
    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if args.create_admin {
        if let Err(e) = handle_create_admin(
            &db,
            args.admin_username.as_deref(),
            args.admin_password.as_deref(),
        )
        .await
        {
            error!(error = %e, "Admin bootstrap failed");
            std::process::exit(1);
        }
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read listener address");
            std::process::exit(1);
        }
    };

    let config = build_config(db, tokens, &args);

    info!(address = %local_addr, environment = ?args.environment, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
