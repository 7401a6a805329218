use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ritual_engine::{
    fn_step, Board, BoardConfig, PullRequest, Registry, Step, Tag, TagContext,
};

/// Route a string through the document pipeline and print the path taken.
#[derive(Parser, Debug)]
#[command(name = "ritual-demo")]
struct Args {
    /// Text to route.
    #[arg(default_value = "hi!")]
    input: String,

    /// Seed tag, e.g. `style:loud` or `to:#2`. Repeatable.
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    #[arg(long, value_enum, default_value_t = Mode::Push)]
    mode: Mode,

    /// Register the `Style` trick fencing Loud and Quiet.
    #[arg(long)]
    trick: bool,

    /// Step guard; overrides RITUAL_MAX_STEPS. Pull mode defaults to 16,
    /// since Doc -> Doc handlers stay eligible on every call.
    #[arg(long)]
    max_steps: Option<usize>,
}

const PULL_STEP_GUARD: usize = 16;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Push,
    Pull,
}

#[derive(Debug)]
struct Doc {
    text: String,
}

struct Loud;

#[async_trait]
impl Step<Doc, Doc> for Loud {
    async fn run(&self, doc: Doc, cx: &mut TagContext<'_>) -> Result<Doc> {
        cx.add("styled");
        Ok(Doc {
            text: doc.text.to_uppercase(),
        })
    }

    fn supported_tags(&self) -> Vec<Tag> {
        vec![Tag::new("style:loud")]
    }
}

struct Quiet;

#[async_trait]
impl Step<Doc, Doc> for Quiet {
    async fn run(&self, doc: Doc, cx: &mut TagContext<'_>) -> Result<Doc> {
        cx.add("styled");
        Ok(Doc {
            text: doc.text.to_lowercase(),
        })
    }

    fn supported_tags(&self) -> Vec<Tag> {
        vec![Tag::new("style:quiet")]
    }
}

fn registry(with_trick: bool) -> Registry {
    let mut builder = Registry::builder().step(
        "Parse",
        fn_step(|text: String, _cx| {
            Ok(Doc {
                text: text.trim().to_string(),
            })
        }),
        Vec::<Tag>::new(),
    );
    if with_trick {
        builder = builder.trick::<Doc>("Style", ["Loud", "Quiet"]);
    }
    builder
        .step("Loud", Loud, Vec::<Tag>::new())
        .step("Quiet", Quiet, Vec::<Tag>::new())
        .step(
            "Finish",
            fn_step(|doc: Doc, _cx| Ok(format!("<{}>", doc.text))),
            // `next:Finish` is the router's own hint; scoring on it lets pull
            // chains leave Loud/Quiet once a style has been applied.
            ["styled", "next:Finish"],
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ritual_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = BoardConfig::from_env()?;
    if let Some(limit) = args.max_steps {
        config.max_steps = Some(limit);
    }
    if matches!(args.mode, Mode::Pull) && config.max_steps.is_none() {
        config.max_steps = Some(PULL_STEP_GUARD);
    }
    config.log_summary();

    let board = Board::new(registry(args.trick)).with_config(config);

    match args.mode {
        Mode::Push => {
            let cancel = ritual_engine::CancellationToken::new();
            let ritual = board
                .invoke_with::<String, String>(args.input, args.tags, &cancel)
                .await?;
            info!(path = ?ritual.trail.names(), "Push complete");
            println!("{}", ritual.value);
            println!("path: {}", ritual.trail.names().join(" -> "));
        }
        Mode::Pull => {
            let driver = board.pull_driver::<String>();
            let mut request = PullRequest::new(args.input).with_tags(args.tags);
            let mut path = Vec::new();
            loop {
                let response = driver.advance(request).await?;
                if let Some(step) = &response.step {
                    path.push(step.name.clone());
                }
                if response.is_final || response.step.is_none() {
                    match response.output.downcast_ref::<String>() {
                        Some(text) => println!("{text}"),
                        None => println!("settled on {}", response.output.kind()),
                    }
                    break;
                }
                request = response.into_request();
            }
            println!("path: {}", path.join(" -> "));
        }
    }

    Ok(())
}
