use calfocus::components::calendar::Provider;
use calfocus::components::google_calendar::TokenManager as GoogleTokens;
use calfocus::components::microsoft_calendar::{PkceChallenge, TokenManager as MicrosoftTokens};
use calfocus::components::store::StoreActor;
use calfocus::config::Config;
use calfocus::error::{config_error, env_error, other_error, SyncResult};
use calfocus::startup;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// Sign in to a calendar provider and store the resulting token
#[derive(Debug, Parser)]
#[command(name = "authorize")]
struct Args {
    /// `google` or `microsoft`
    provider: Provider,

    /// Print the URL instead of opening a browser
    #[arg(long)]
    no_browser: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

/// Values parsed from the redirect request
struct Callback {
    code: String,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Args::parse();

    // Initialize logging
    startup::init_logging(args.verbose)?;

    // Load configuration
    let config = Config::load()?;
    let redirect_uri = config.redirect_uri.clone();
    let store = StoreActor::spawn(&config.store_url)?;
    let config = Arc::new(RwLock::new(config));

    // Generate random state for security
    let state = uuid::Uuid::new_v4().to_string();

    match args.provider {
        Provider::Google => {
            if !config.read().await.google_configured() {
                return Err(env_error("GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET").into());
            }
            let tokens = GoogleTokens::new(Arc::clone(&config), store.clone());
            let auth_url = tokens.authorization_url(&state).await?;

            open_browser(&auth_url, args.no_browser)?;
            let callback = wait_for_callback(&redirect_uri, &state)?;
            tokens.exchange_code(&callback.code).await?;
        }
        Provider::Microsoft => {
            if !config.read().await.microsoft_configured() {
                return Err(env_error("MICROSOFT_CLIENT_ID").into());
            }
            let tokens = MicrosoftTokens::new(Arc::clone(&config), store.clone());
            let pkce = PkceChallenge::new();
            let auth_url = tokens.authorization_url(&state, &pkce).await?;

            open_browser(&auth_url, args.no_browser)?;
            let callback = wait_for_callback(&redirect_uri, &state)?;
            tokens.exchange_code(&callback.code, &pkce.verifier).await?;
        }
    }

    store.shutdown().await?;
    println!("{} token successfully saved!", args.provider);

    Ok(())
}

fn open_browser(auth_url: &str, no_browser: bool) -> SyncResult<()> {
    if no_browser {
        println!("Open this URL to authorize:\n{}", auth_url);
        return Ok(());
    }

    println!("Opening browser for authorization...");
    if webbrowser::open(auth_url).is_err() {
        println!("Could not open a browser. Open this URL instead:\n{}", auth_url);
    }
    Ok(())
}

/// Serve the loopback redirect until a request carrying a code (or an
/// error) arrives
fn wait_for_callback(redirect_uri: &str, expected_state: &str) -> SyncResult<Callback> {
    let redirect = Url::parse(redirect_uri)
        .map_err(|e| config_error(&format!("Invalid REDIRECT_URI: {}", e)))?;
    let host = redirect.host_str().unwrap_or("localhost");
    let port = redirect.port_or_known_default().unwrap_or(8080);

    // Start local server to receive the callback
    let server = tiny_http::Server::http((host, port))
        .map_err(|e| other_error(&format!("Failed to listen on {}:{}: {}", host, port, e)))?;
    println!("Waiting for authorization callback on {}...", redirect_uri);

    loop {
        let request = server.recv()?;
        let url = Url::parse(&format!("http://{}:{}{}", host, port, request.url()))
            .map_err(|e| other_error(&format!("Malformed callback URL: {}", e)))?;

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            let description = param("error_description").unwrap_or_default();
            let _ = request.respond(tiny_http::Response::from_string(
                "Authorization failed. You can close this window.",
            ));
            return Err(other_error(&format!("Authorization denied: {} {}", error, description)));
        }

        let Some(code) = param("code") else {
            // favicon and friends
            let _ = request.respond(tiny_http::Response::empty(tiny_http::StatusCode(404)));
            continue;
        };

        let state = param("state").unwrap_or_default();
        if state != expected_state {
            let _ = request.respond(tiny_http::Response::from_string(
                "State mismatch. Please start the authorization again.",
            ));
            return Err(other_error("State parameter did not match, aborting"));
        }

        // Send success response to browser
        request.respond(tiny_http::Response::from_string(
            "Authorization successful! You can close this window.",
        ))?;

        return Ok(Callback { code });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_is_accepted() {
        let args = Args::try_parse_from(["authorize", "microsoft", "-v", "--no-browser"]).unwrap();
        assert_eq!(args.provider, Provider::Microsoft);
        assert!(args.verbose);
        assert!(args.no_browser);

        let quiet = Args::try_parse_from(["authorize", "google"]).unwrap();
        assert!(!quiet.verbose);
    }
}
