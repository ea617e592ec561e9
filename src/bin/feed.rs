//! CLI that loads the catalog through the client fetch layer.
//!
//! Every `--category` is loaded concurrently; the loads share one fetch.

use anyhow::Result;
use clap::Parser;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshmart::client::{
    paginate, search, sort, FeedOrigin, FeedState, HttpSource, ModelFeed, RetryPolicy, SortOrder,
    DEFAULT_PAGE_SIZE,
};
use meshmart::config::Config;

#[derive(Parser, Debug)]
#[command(name = "meshmart-feed", version, about = "Browse the meshmart catalog from the terminal")]
struct Cli {
    /// Catalog endpoint, relative to `client.base_url`
    #[arg(long, default_value = "/api/models")]
    endpoint: String,

    /// Category to load; repeat for several
    #[arg(short, long)]
    category: Vec<String>,

    /// Case-insensitive text search
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long, value_enum, default_value_t = SortOrder::Newest)]
    sort: SortOrder,

    /// 1-indexed page
    #[arg(short, long, default_value_t = 1)]
    page: usize,

    /// Bearer token sent with every request
    #[arg(long)]
    token: Option<String>,
}

fn print_state(label: &str, state: &FeedState, args: &Cli) {
    let origin = match state.origin {
        FeedOrigin::Network => "live",
        FeedOrigin::Stale => "cached",
        FeedOrigin::Placeholder => "placeholder",
    };
    println!("== {} ({}) ==", label, origin);
    if let Some(error) = &state.error {
        println!("   error: {}", error);
    }
    for problem in &state.rejected {
        println!("   skipped: {}", problem);
    }

    let mut listings = match &args.search {
        Some(query) => search(&state.listings, query),
        None => state.listings.clone(),
    };
    sort(&mut listings, args.sort);
    let page = paginate(&listings, args.page, DEFAULT_PAGE_SIZE);

    for listing in &page.items {
        println!(
            "   #{:<5} {:<40} {:>8.2}  {:<12} by {}{}",
            listing.id,
            listing.title,
            listing.price as f64 / 100.0,
            listing.category,
            listing.creator_name,
            if listing.direct_print_enabled { "  [print]" } else { "" }
        );
    }
    println!(
        "   page {}/{} ({} listings)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshmart=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();
    let config = Config::load_with_env(Path::new("config.yml"))?;

    let mut source = HttpSource::new(&config.client.base_url)?;
    if let Some(token) = &args.token {
        source = source.with_token(token.clone());
    }
    let feed = ModelFeed::new(
        Arc::new(source),
        RetryPolicy::from_config(&config.client),
        config.client.dedup_window(),
    );

    if args.category.is_empty() {
        let state = feed.load(&args.endpoint, None).await;
        print_state("All models", &state, &args);
    } else {
        let states = join_all(
            args.category
                .iter()
                .map(|category| feed.load(&args.endpoint, Some(category.as_str()))),
        )
        .await;
        for (category, state) in args.category.iter().zip(&states) {
            print_state(category, state, &args);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(raw: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("meshmart-feed").chain(raw.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse(&["--category", "Gaming", "-c", "Art", "--sort", "price-desc", "--page", "2"]).unwrap();
        assert_eq!(parsed.category, vec!["Gaming", "Art"]);
        assert_eq!(parsed.sort, SortOrder::PriceDesc);
        assert_eq!(parsed.page, 2);

        let defaults = parse(&[]).unwrap();
        assert_eq!(defaults.page, 1);
        assert_eq!(defaults.sort, SortOrder::Newest);
        assert_eq!(defaults.endpoint, "/api/models");
        assert!(defaults.category.is_empty());
        assert!(defaults.token.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse(&["--category"]).is_err());
        assert!(parse(&["--page", "two"]).is_err());
        assert!(parse(&["--sort", "cheapest"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
