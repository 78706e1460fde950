#![doc = include_str!("../README.md")]
#![warn(
    clippy::pedantic,
    clippy::missing_docs_in_private_items,
    missing_docs,
    rust_2018_idioms
)]

use axum::{Router, routing::get};
use db::Repository;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

mod auth;
mod common;
mod config;
mod db;
mod expr;
mod pages;
mod parser;
mod special;
mod tasks;
mod title;

/// Global application state.
struct WikiState {
    /// The shared page repository.
    repo: Arc<Repository>,
}

/// Global application state, shareable across threads.
type AppState = Arc<WikiState>;

/// Errors that may occur when parsing arguments.
#[derive(Debug, thiserror::Error)]
enum ArgsError {
    /// Extra unknown junk on the command line.
    #[error("unknown arguments: {}", _0.display())]
    Extra(std::ffi::OsString),
    /// Some other parsing error.
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

/// Command-line arguments.
struct Args {
    /// The bind address for the web server.
    bind: String,
    /// The display name of the wiki.
    site_name: String,
    /// The host name used when emitting absolute URLs.
    server_name: Option<String>,
}

impl Args {
    /// Tries to create an [`Args`] from the given command line arguments and
    /// environment variables.
    fn new() -> Result<Args, ArgsError> {
        let mut args = pico_args::Arguments::from_env();
        let bind = args
            .opt_value_from_str("--bind")?
            .or_else(|| std::env::var("WIKID_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let site_name = args
            .opt_value_from_str("--site-name")?
            .or_else(|| std::env::var("WIKID_SITE_NAME").ok())
            .unwrap_or_else(|| "wikid".to_string());
        let server_name = args.opt_value_from_str("--server-name")?;

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(ArgsError::Extra(
                rest.join(std::ffi::OsStr::new(" ")),
            ));
        }

        Ok(Self {
            bind,
            site_name,
            server_name,
        })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [options]\n");
    eprintln!("Options:");
    eprintln!("  --bind: Web server bind (default: 127.0.0.1:3000)");
    eprintln!("  --site-name: Display name of the wiki (default: wikid)");
    eprintln!("  --server-name: Host name for absolute URLs (default: bind address)");
    eprintln!("\nEnvironment variables: WIKID_BIND, WIKID_SITE_NAME");
}

/// Ensures the wiki has a main page to land on.
fn seed_main_page(repo: &Repository) {
    let (ns, page_title) = title::split_title(config::MAIN_PAGE_TITLE);
    if repo.get(ns, &page_title).exists {
        return;
    }
    let Some(setup) = repo.user_by_name(config::SETUP_USERNAME) else {
        return;
    };
    let result = repo.edit(db::EditRequest {
        author: &setup,
        namespace: ns,
        title: page_title,
        content: "Welcome to {= SITE_NAME =}.\n\n\
                  This wiki has {= NUMBER_OF_PAGES =} page(s) and \
                  {= NUMBER_OF_USERS =} user(s).\n"
            .to_string(),
        comment: Some("Initial setup".to_string()),
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id: None,
    });
    match result {
        Ok(_) => log::info!("Created {}", config::MAIN_PAGE_TITLE),
        Err(err) => log::warn!("Could not create the main page: {err}"),
    }
}

/// Starts the wiki.
#[tokio::main]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            usage();
            return Err(err)?;
        }
    };

    log::info!("Starting up wikid ...");

    let server_name = args.server_name.unwrap_or_else(|| args.bind.clone());
    config::init_site(args.site_name, server_name);

    let repo = Arc::new(Repository::new());
    seed_main_page(&repo);

    tasks::spawn(Arc::clone(&repo));

    let state = AppState::new(WikiState { repo });
    let app = Router::new()
        .route("/", get(pages::index_page))
        .route("/wiki", get(pages::wiki_root))
        .route("/wiki/", get(pages::wiki_root))
        .route("/wiki/{*raw_title}", get(pages::wiki_get).post(pages::wiki_post))
        .route("/wiki-api", get(pages::wiki_api))
        .with_state(state);

    let listener = TcpListener::bind(&args.bind).await?;
    log::info!("Listening at {}", args.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(Into::into)
}

/// Uses the [`Display`](core::fmt::Display) formatter for an error even when
/// the [`Debug`](core::fmt::Debug) formatter is requested.
struct DisplayError(Box<dyn std::error::Error>);

impl core::fmt::Debug for DisplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Into<Box<dyn std::error::Error>>> From<E> for DisplayError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

fn main() -> Result<(), DisplayError> {
    run().map_err(Into::into)
}
