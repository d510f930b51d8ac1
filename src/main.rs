use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use scanner_auth::{
    AuthFlowController, AuthSession, AuthState, DeviceFlowConfig, HttpProviderClient, OAuthError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "scanner-auth",
    about = "Sign a device in with the OAuth device authorization grant and print the session as JSON."
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the device flow until it is approved, expires or times out.
    Login(LoginArgs),
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// Authorization server base URL, e.g. https://example.okta.com/oauth2/default
    #[arg(long, env = "SCANNER_AUTH_ISSUER")]
    issuer: String,

    #[arg(long, env = "SCANNER_AUTH_CLIENT_ID")]
    client_id: String,

    #[arg(
        long,
        env = "SCANNER_AUTH_SCOPES",
        value_delimiter = ' ',
        default_value = "openid profile email"
    )]
    scopes: Vec<String>,

    #[arg(long, env = "SCANNER_AUTH_REDIRECT_URI")]
    redirect_uri: Option<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Open the verification page in the default browser.
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, OAuthError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Login(args) => run_login(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_login(args: LoginArgs) -> Result<ExitCode, OAuthError> {
    let mut config = DeviceFlowConfig::new(args.issuer, args.client_id)
        .with_scopes(args.scopes)
        .with_timeout(Duration::from_secs(args.timeout));
    if let Some(redirect_uri) = args.redirect_uri {
        config = config.with_redirect_uri(redirect_uri);
    }
    let policy = config.policy;

    let provider = HttpProviderClient::new(config)?;
    let controller = Arc::new(AuthFlowController::with_policy(provider, policy));
    let mut transitions = controller.transitions();
    let handle = controller.spawn();

    loop {
        match transitions.recv().await {
            Ok(AuthState::QrDisplay) => show_codes(&controller.snapshot(), args.open),
            Ok(state) => {
                eprintln!("[{state}]");
                if state.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    let session = handle.await.map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body: String::new(),
    })?;

    let output =
        serde_json::to_string_pretty(&session).map_err(|err| OAuthError::InvalidResponse {
            message: err.to_string(),
            body: String::new(),
        })?;
    println!("{output}");

    if session.state == AuthState::Authenticated {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn show_codes(session: &AuthSession, open: bool) {
    let (Some(user_code), Some(verification_uri)) =
        (session.user_code(), session.verification_uri())
    else {
        return;
    };

    eprintln!("Visit {verification_uri} and enter code: {user_code}");
    if open {
        let target = session
            .codes
            .as_ref()
            .and_then(|codes| codes.verification_uri_complete.as_deref())
            .unwrap_or(verification_uri);
        if let Err(err) = webbrowser::open(target) {
            eprintln!("Failed to open browser automatically: {err}");
        }
    }
}
