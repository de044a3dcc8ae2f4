use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use quire::cms::{Article, FeedScope};
use quire::paginate::{PageOutcome, PageRedirect};
use quire::{CmsContext, Config};

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "A caching GraphQL content client for headless-CMS blogs")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/quire/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load the homepage sections
  Home {
    /// Load this many extra pages of the main feed
    #[arg(long, default_value_t = 0)]
    more: u32,
  },
  /// Page through a feed with cursors
  Feed {
    #[arg(long, conflicts_with = "tag")]
    category: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    /// Keep loading until the feed is exhausted
    #[arg(long)]
    all: bool,
    #[arg(long)]
    page_size: Option<u32>,
  },
  /// Show one numbered archive page
  Page {
    number: u32,
    #[arg(long)]
    per_page: Option<u32>,
  },
  /// Show a single post
  Post { slug: String },
  /// Load the homepage and dump the cache as JSON
  Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = quire::logging::init(&config.logging)?;

  let context = CmsContext::from_config(&config)?;

  match args.command {
    Command::Home { more } => home(&context, more).await?,
    Command::Feed {
      category,
      tag,
      all,
      page_size,
    } => {
      let scope = match (category, tag) {
        (Some(slug), _) => FeedScope::Category(slug),
        (None, Some(tag)) => FeedScope::Tag(tag),
        (None, None) => FeedScope::All,
      };
      feed(&context, scope, all, page_size).await?;
    }
    Command::Page { number, per_page } => {
      page(&context, number, per_page.unwrap_or(context.per_page)).await?
    }
    Command::Post { slug } => post(&context, &slug).await?,
    Command::Snapshot => {
      context.homepage().load().await;
      let snapshot = context.store.extract_all()?;
      println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
  }

  Ok(())
}

async fn home(context: &CmsContext, more: u32) -> Result<()> {
  let homepage = context.homepage();
  homepage.load().await;

  for _ in 0..more {
    homepage.load_more_main_posts().await?;
  }

  if let Some(error) = homepage.page_error() {
    return Err(eyre!("Homepage unavailable: {}", error));
  }

  let state = homepage.get_state();
  print_section("Featured", &state.data.featured);
  print_section("Latest", &state.data.main_posts);
  if state.data.has_more_main_posts {
    println!(
      "  ... {} of {} loaded",
      state.data.main_posts.len(),
      state.data.total_posts
    );
  }
  print_section("Recent", &state.data.recent);

  println!("\nCategories");
  for category in &state.data.categories {
    println!("  {:<20} {}", category.slug, category.name);
  }

  for (branch, error) in &state.errors {
    eprintln!("warning: {} failed: {}", branch, error);
  }
  Ok(())
}

async fn feed(
  context: &CmsContext,
  scope: FeedScope,
  all: bool,
  page_size: Option<u32>,
) -> Result<()> {
  let mut paginator = context.feed(scope);
  if let Some(size) = page_size {
    paginator = paginator.with_page_size(size);
  }

  paginator.load_initial().await?;
  while all && paginator.has_more()? {
    paginator.load_more(None).await?;
  }

  let view = paginator.view()?;
  print_section("Posts", &view.items);
  println!(
    "\n{} of {} loaded{}",
    view.items.len(),
    view.total_count,
    if view.has_more { ", more available" } else { "" }
  );
  Ok(())
}

async fn page(context: &CmsContext, number: u32, per_page: u32) -> Result<()> {
  match context.archive().get_page(number, per_page).await? {
    PageOutcome::Redirect(PageRedirect::Root) => println!("redirect: /"),
    PageOutcome::Redirect(PageRedirect::Page(n)) => println!("redirect: /page/{}", n),
    PageOutcome::Page(page) => {
      print_section(&format!("Page {} of {}", page.current_page, page.total_pages), &page.items);
      println!(
        "\nprev: {}  next: {}",
        if page.has_prev_page { "yes" } else { "no" },
        if page.has_next_page { "yes" } else { "no" }
      );
    }
  }
  Ok(())
}

async fn post(context: &CmsContext, slug: &str) -> Result<()> {
  let result = context.client.post(slug, context.policy).await?;
  let article = result
    .data
    .ok_or_else(|| eyre!("No post with slug {}", slug))?;

  println!("{}", article.title);
  println!("{}", article.published_at.format("%Y-%m-%d"));
  if let Some(author) = &article.author {
    println!("by {}", author.name);
  }
  if let Some(excerpt) = &article.excerpt {
    println!("\n{}", excerpt);
  }
  Ok(())
}

fn print_section(title: &str, articles: &[Article]) {
  println!("\n{}", title);
  for article in articles {
    println!(
      "  {}  {:<40} {}",
      article.published_at.format("%Y-%m-%d"),
      article.slug,
      article.title
    );
  }
}
