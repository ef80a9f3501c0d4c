use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use evo::llm::config::{CompletionConfig, normalize_base_url};
use evo::llm::{CompletionClient, CompletionError};
use evo::services::conversation::{ConversationSession, SubmitOutcome};
use evo::services::identity::{
    AuthOperation, FederatedCredential, FirebaseIdentity, IdentityConfig, IdentityError, IdentityProvider, User,
};
use evo::state::auth::{AuthScreen, AuthState, Route};
use evo::state::chat::{Message, Sender};
use evo::state::ui::Theme;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type Terminal = Console<BufReader<Stdin>>;

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

const AUTH_HELP: &str =
    "(commands: login, signup, reset, google <id-token>, quit; passwords are echoed as you type them)";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("completion setup failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("identity setup failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "evo", about = "Chat with the evo wellness coach")]
struct Cli {
    /// Answer with canned replies; no sign-in or network needed.
    #[arg(long, default_value_t = false)]
    offline: bool,

    #[arg(long, env = "EVO_API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long, env = "EVO_API_TOKEN")]
    api_token: Option<String>,

    #[arg(long, env = "FIREBASE_API_KEY")]
    firebase_api_key: Option<String>,
}

/// Whether the main loop should keep going after a screen returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut completion = CompletionConfig::from_env()?;
    if let Some(url) = &cli.api_base_url {
        completion.base_url = normalize_base_url(url);
    }
    if let Some(token) = cli.api_token.as_ref().filter(|t| !t.trim().is_empty()) {
        completion.api_token = Some(token.clone());
    }

    let interrupt = Interrupt::install();
    let mut console = Console::new(BufReader::new(tokio::io::stdin()), interrupt.clone());

    if cli.offline {
        info!("running offline with canned replies");
        let client = CompletionClient::offline(evo::llm::canned::DEFAULT_CANNED_DELAY);
        chat_screen(client, None, None, &mut console).await?;
    } else {
        run_online(&cli, &completion, &mut console).await?;
    }

    // Stdin's blocking reader would hold up runtime shutdown until Enter.
    if interrupt.fired() {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
    Ok(())
}

fn init_tracing() {
    let filter = log_filter(std::env::var("EVO_LOG").ok());
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// `EVO_LOG` directives such as `evo=debug,reqwest=info`; `warn` when unset
/// or unparseable.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

async fn run_online(cli: &Cli, completion: &CompletionConfig, console: &mut Terminal) -> Result<(), CliError> {
    let identity_config = IdentityConfig::from_lookup(|key| match key {
        "FIREBASE_API_KEY" => cli.firebase_api_key.clone(),
        other => std::env::var(other).ok(),
    })?;
    let identity = FirebaseIdentity::new(identity_config)?;

    let mut changes = identity.subscribe();
    let mut auth = AuthState::default();
    let mut screen = AuthScreen::Login;
    loop {
        if auth.sync(&mut changes) {
            info!(signed_in = auth.user.is_some(), "auth state changed");
        }
        let next = match auth.route(screen) {
            Route::Loading => continue,
            Route::Auth(requested) => auth_screen(&identity, requested, &mut screen, console).await?,
            Route::Chat => {
                let user = auth.user.clone();
                let token = user.as_ref().map(|u| u.id_token.as_str());
                let client = CompletionClient::from_config(completion, token)?;
                chat_screen(client, Some(&identity), user.as_ref(), console).await?
            }
        };
        if next == Next::Quit {
            return Ok(());
        }
    }
}

// =============================================================================
// INTERRUPT
// =============================================================================

/// Process-wide Ctrl-C latch. Once fired it stays fired, so every prompt and
/// pending submission after the keypress sees it.
#[derive(Clone)]
struct Interrupt {
    fired: watch::Receiver<bool>,
}

impl Interrupt {
    fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { fired: rx })
    }

    /// Install the one SIGINT listener for the whole program.
    fn install() -> Self {
        let (tx, interrupt) = Self::new();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tx.send_replace(true);
                }
                Err(e) => warn!(error = %e, "could not listen for Ctrl-C"),
            }
        });
        interrupt
    }

    fn fired(&self) -> bool {
        *self.fired.borrow()
    }

    /// Resolve once Ctrl-C has been pressed; never resolves if the listener
    /// is gone without firing.
    async fn wait(&self) {
        let mut fired = self.fired.clone();
        if fired.wait_for(|hit| *hit).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// CONSOLE
// =============================================================================

/// Line input that gives up when the interrupt fires.
struct Console<R> {
    lines: Lines<R>,
    interrupt: Interrupt,
}

impl<R: AsyncBufRead + Unpin> Console<R> {
    fn new(reader: R, interrupt: Interrupt) -> Self {
        Self { lines: reader.lines(), interrupt }
    }

    /// Print `label` and read one line. `None` on end of input or Ctrl-C.
    async fn prompt(&mut self, label: &str) -> Result<Option<String>, CliError> {
        print!("{label}");
        std::io::stdout().flush()?;
        tokio::select! {
            line = self.lines.next_line() => Ok(line?.map(|l| l.trim_end_matches('\r').to_string())),
            () = self.interrupt.wait() => {
                println!();
                Ok(None)
            }
        }
    }
}

// =============================================================================
// AUTH SCREEN
// =============================================================================

async fn auth_screen(
    identity: &FirebaseIdentity,
    requested: AuthScreen,
    screen: &mut AuthScreen,
    console: &mut Terminal,
) -> Result<Next, CliError> {
    let title = match requested {
        AuthScreen::Login => "Log in",
        AuthScreen::Signup => "Sign up",
        AuthScreen::ResetPassword => "Reset password",
    };
    println!("\n== {title} ==  {AUTH_HELP}");

    let Some(line) = console.prompt("auth> ").await? else {
        return Ok(Next::Quit);
    };
    let mut words = line.split_whitespace();
    match words.next().unwrap_or_default() {
        "" => {}
        "quit" | "exit" => return Ok(Next::Quit),
        "login" => {
            *screen = AuthScreen::Login;
            let Some((email, password)) = read_credentials(console).await? else {
                return Ok(Next::Quit);
            };
            if let Err(e) = identity.login(&email, &password).await {
                println!("{}", e.user_message(AuthOperation::Login));
            }
        }
        "signup" => {
            *screen = AuthScreen::Signup;
            let Some((email, password)) = read_credentials(console).await? else {
                return Ok(Next::Quit);
            };
            if let Err(e) = identity.signup(&email, &password).await {
                println!("{}", e.user_message(AuthOperation::Signup));
            }
        }
        "reset" => {
            *screen = AuthScreen::ResetPassword;
            let Some(email) = console.prompt("email: ").await? else {
                return Ok(Next::Quit);
            };
            match identity.reset_password(&email).await {
                Ok(()) => {
                    println!("Password reset email sent! Check your inbox.");
                    *screen = AuthScreen::Login;
                }
                Err(e) => println!("{}", e.user_message(AuthOperation::ResetPassword)),
            }
        }
        "google" => {
            let credential = FederatedCredential::google(words.next().unwrap_or_default());
            if let Err(e) = identity.login_with_federated_provider(&credential).await {
                println!("{}", e.user_message(AuthOperation::FederatedLogin));
            }
        }
        other => println!("unknown command: {other}"),
    }
    Ok(Next::Continue)
}

async fn read_credentials<R: AsyncBufRead + Unpin>(
    console: &mut Console<R>,
) -> Result<Option<(String, String)>, CliError> {
    let Some(email) = console.prompt("email: ").await? else {
        return Ok(None);
    };
    let Some(password) = console.prompt("password: ").await? else {
        return Ok(None);
    };
    Ok(Some((email, password)))
}

// =============================================================================
// CHAT SCREEN
// =============================================================================

/// Run one chat screen. The session lives exactly as long as this call.
async fn chat_screen(
    client: CompletionClient,
    identity: Option<&FirebaseIdentity>,
    user: Option<&User>,
    console: &mut Terminal,
) -> Result<Next, CliError> {
    info!(service = %client.describe(), "chat session started");
    let session = ConversationSession::new(Arc::new(client));
    let mut shown = 0_u64;

    match user {
        Some(user) => println!("\nfit by evo  (signed in as {})", user.label()),
        None => println!("\nfit by evo"),
    }
    println!("(commands: /menu, /theme, /logout, /quit)");
    render_new(&session.messages(), &mut shown, session.ui().theme);

    let next = loop {
        let Some(line) = console.prompt("> ").await? else {
            break Next::Quit;
        };
        match line.trim() {
            "/quit" => break Next::Quit,
            "/logout" => {
                if let Some(identity) = identity {
                    if let Err(e) = identity.logout().await {
                        println!("{}", e.user_message(AuthOperation::Logout));
                        continue;
                    }
                    break Next::Continue;
                }
                println!("not signed in");
            }
            "/menu" => {
                if session.toggle_menu() {
                    println!("  /theme   {}", session.ui().theme.toggle_label());
                    if identity.is_some() {
                        println!("  /logout  Log out");
                    }
                }
            }
            "/theme" => {
                let theme = session.toggle_theme();
                session.close_menu();
                println!("theme: {}", theme_name(theme));
            }
            _ => {
                session.set_draft(line.as_str());
                if submit_with_indicator(&session, &console.interrupt).await == Next::Quit {
                    break Next::Quit;
                }
                render_new(&session.messages(), &mut shown, session.ui().theme);
            }
        }
    };

    session.dispose();
    Ok(next)
}

/// Submit the draft on its own task while showing a typing indicator.
/// Ctrl-C disposes the session and discards the pending reply.
async fn submit_with_indicator(session: &ConversationSession, interrupt: &Interrupt) -> Next {
    let task = tokio::spawn({
        let session = session.clone();
        async move { session.submit_draft().await }
    });
    print!("evo is typing...\r");
    let _ = std::io::stdout().flush();

    tokio::select! {
        joined = task => {
            match joined {
                Ok(SubmitOutcome::Fallback | SubmitOutcome::SoftFailure) => info!("reply replaced by failure message"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "submission task failed"),
            }
            Next::Continue
        }
        () = interrupt.wait() => {
            session.dispose();
            Next::Quit
        }
    }
}

fn render_new(messages: &[Message], shown: &mut u64, theme: Theme) {
    let after = *shown;
    for message in messages.iter().filter(|m| m.id > after && !m.is_pending()) {
        let who = match message.sender {
            Sender::User => "you",
            Sender::Assistant => "evo",
        };
        match theme {
            Theme::Dark => println!("{who}: {}", message.text),
            Theme::Wellness => println!("~ {who} ~ {}", message.text),
        }
        *shown = message.id;
    }
}

fn theme_name(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => "dark",
        Theme::Wellness => "wellness",
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
