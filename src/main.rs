use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use oauth_flow::{
    Auth, AuthError, AuthOutcome, AuthorizationCodePkce, BrowserContext, CallbackListener,
    ClientCredentials, ContextStrategy, CredentialMode, StorageKind,
};

#[derive(Debug, Parser)]
#[command(
    name = "oauth-flow",
    about = "Drive an OAuth 2.0 grant flow and print the resulting token as JSON."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorization Code + PKCE through the system browser.
    Pkce(PkceArgs),
    /// Direct client-credentials exchange, no browser involved.
    ClientCredentials(ClientCredentialsArgs),
}

#[derive(Debug, Args)]
struct PkceArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    authorization_uri: String,
    #[arg(long)]
    token_uri: String,
    #[arg(long, default_value = "http://localhost:8765/callback")]
    redirect_uri: String,
    #[arg(long)]
    scope: Vec<String>,
}

#[derive(Debug, Args)]
struct ClientCredentialsArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    client_secret: String,
    #[arg(long)]
    token_uri: String,
    #[arg(long)]
    scope: Vec<String>,
    /// Send credentials as an HTTP Basic header instead of the request body.
    #[arg(long)]
    basic_auth: bool,
}

#[tokio::main]
async fn main() -> Result<(), AuthError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Pkce(args) => run_pkce(args).await,
        Command::ClientCredentials(args) => run_client_credentials(args).await,
    }
}

async fn run_pkce(args: PkceArgs) -> Result<(), AuthError> {
    let opened = AtomicBool::new(false);
    let context = Arc::new(BrowserContext::new().with_navigator(move |url| {
        if opened.swap(true, Ordering::SeqCst) {
            // The post-login navigation has nowhere to go in a terminal flow.
            return Ok(());
        }
        eprintln!("Authorization URL:\n{url}");
        if let Err(err) = webbrowser::open(url) {
            eprintln!("Failed to open browser automatically: {err}");
        }
        Ok(())
    }));

    let grant = AuthorizationCodePkce::new(
        args.client_id,
        args.token_uri,
        args.authorization_uri,
        args.redirect_uri.clone(),
        args.redirect_uri.clone(),
    );

    let auth = Auth::new();
    auth.init(context.clone(), grant, StorageKind::Cookie);

    let scopes: Vec<&str> = args.scope.iter().map(String::as_str).collect();
    if auth.authenticate(&scopes).await? == AuthOutcome::RedirectIssued {
        let callback = CallbackListener::new(&args.redirect_uri)?.capture().await?;
        context.set_callback_url(callback.as_str())?;
        auth.authenticate(&scopes).await?;
    }

    print_token(context.as_ref()).await
}

async fn run_client_credentials(args: ClientCredentialsArgs) -> Result<(), AuthError> {
    let context = Arc::new(BrowserContext::new());
    let mode = if args.basic_auth {
        CredentialMode::Header
    } else {
        CredentialMode::Request
    };
    let grant = ClientCredentials::new(args.client_id, args.client_secret, args.token_uri)
        .with_credential_mode(mode);

    let auth = Auth::new();
    auth.init(context.clone(), grant, StorageKind::Cookie);

    let scopes: Vec<&str> = args.scope.iter().map(String::as_str).collect();
    auth.authenticate(&scopes).await?;

    print_token(context.as_ref()).await
}

async fn print_token(context: &dyn ContextStrategy) -> Result<(), AuthError> {
    let token = context
        .token_storage(StorageKind::Cookie)
        .await
        .get()
        .ok_or_else(|| AuthError::InvalidResponse {
            message: "no token stored after the flow completed".to_string(),
        })?;
    let output =
        serde_json::to_string_pretty(&token).map_err(|err| AuthError::InvalidResponse {
            message: err.to_string(),
        })?;
    println!("{output}");
    Ok(())
}
