use std::net::SocketAddr;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use keystone::logging::init_tracing;
use keystone::modules::users::UserService;
use keystone::router::init_router;
use keystone::state::{Settings, init_app_state};
use keystone::tasks::spawn_background_tasks;
use keystone_config::jwt::DEVELOPMENT_SECRET;
use keystone_models::Role;
use keystone_models::users::CreateUserRequest;
use tracing::{info, warn};
use validator::Validate;

#[derive(Parser)]
#[command(name = "keystone", version, about = "Keystone user backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an admin user in the configured store
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::CreateAdmin {
            name,
            email,
            password,
        } => create_admin(settings, name, email, password).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    if settings.jwt.secret == DEVELOPMENT_SECRET {
        warn!("JWT_SECRET is the development default; set a real secret before deploying");
    }

    let address = settings.app.bind_address();
    let state = init_app_state(settings).await?;
    let _tasks = spawn_background_tasks(&state);
    let app = init_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(address = %address, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn create_admin(
    settings: Settings,
    name: String,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    let request = CreateUserRequest {
        name,
        email,
        password,
        role: Role::Admin,
    };
    request.validate()?;

    let state = init_app_state(settings).await?;
    let user = UserService::create_user(&state, request)
        .await
        .map_err(|e| anyhow!(e.public_message()))?;

    println!("Admin created");
    println!("   Id:    {}", user.id);
    println!("   Email: {}", user.email);
    Ok(())
}
