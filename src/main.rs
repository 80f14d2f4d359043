use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use wiki_render::{Context, MemoryStore, Options, Parser};

fn usage<T>(err: &'static str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options] <page.wiki>...\n");
    println!("or, use environment variables:");
    println!("    WIKI_TEMPLATES");
    println!("    WIKI_HOST\n");
    println!("Options:");
    println!("    --templates: JSON file with an array of template records");
    println!("    --pages: Text file with one existing page title per line");
    println!("    --config: JSON file with engine options");
    println!("    --page-name: Page name (default: the file name)");
    println!("    --site-name: Site name (default: Wiki)");
    println!("    --host: Server host name (default: localhost)");
    println!("    --auto-create: Create placeholders for missing templates");
    println!("    --json: Print the document and its collected data as JSON\n");
    Err(anyhow::Error::msg(err))
}

fn opt_arg(
    args: &mut pico_args::Arguments,
    name: &'static str,
    key: &str,
) -> anyhow::Result<Option<String>> {
    Ok(args
        .opt_value_from_str::<_, String>(name)?
        .or_else(|| std::env::var(key).ok()))
}

/// Settings shared by every rendered file.
struct Job {
    options: Options,
    page_name: Option<String>,
    site_name: Option<String>,
    host: Option<String>,
    json: bool,
}

impl Job {
    fn render(&self, store: &MemoryStore, path: &Path) -> anyhow::Result<String> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("{}: {err}", path.display()))?;

        let page_name = self.page_name.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().replace('_', " "))
                .unwrap_or_default()
        });
        let mut ctx = Context::new(&page_name);
        if let Some(site_name) = &self.site_name {
            ctx = ctx.with_site_name(site_name.as_str());
        }
        if let Some(host) = &self.host {
            ctx = ctx.with_server_host(host.as_str());
        }

        let time = Instant::now();
        let parser = Parser::new(store, store, ctx).with_options(self.options.clone());
        let document = parser.parse_document(&source);
        log::info!("Rendered {} in {:.2?}", path.display(), time.elapsed());

        if self.json {
            Ok(serde_json::to_string_pretty(&document)?)
        } else {
            Ok(document.html)
        }
    }
}

fn load_pages(store: &MemoryStore, path: &str) -> anyhow::Result<usize> {
    let pages = std::fs::read_to_string(path)?;
    let mut count = 0;
    for title in pages.lines().map(str::trim).filter(|line| !line.is_empty()) {
        store.add_page(title)?;
        count += 1;
    }
    Ok(count)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        return usage("Help requested");
    }
    let templates = opt_arg(&mut args, "--templates", "WIKI_TEMPLATES")?;
    let host = opt_arg(&mut args, "--host", "WIKI_HOST")?;
    let pages = args.opt_value_from_str::<_, String>("--pages")?;
    let config = args.opt_value_from_str::<_, PathBuf>("--config")?;
    let page_name = args.opt_value_from_str("--page-name")?;
    let site_name = args.opt_value_from_str("--site-name")?;
    let auto_create = args.contains("--auto-create");
    let json = args.contains("--json");
    let _ = args.contains("--");

    let files = args
        .finish()
        .into_iter()
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    if files.is_empty() {
        return usage("Missing input file argument");
    }
    if let Some(arg) = files
        .iter()
        .find(|file| file.to_string_lossy().starts_with("--"))
    {
        log::error!("Unknown option {}", arg.display());
        return usage("Unknown extra arguments passed");
    }

    let store = match &templates {
        Some(path) => MemoryStore::from_file(path)?,
        None => MemoryStore::new(),
    };
    log::info!("Loaded {} templates", store.len());

    if let Some(path) = &pages {
        let count = load_pages(&store, path)?;
        log::info!("Loaded {count} page titles");
    }

    let mut options = match &config {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    options.auto_create_templates |= auto_create;

    let job = Job {
        options,
        page_name,
        site_name,
        host,
        json,
    };

    let results = files
        .par_iter()
        .map(|path| job.render(&store, path))
        .collect::<Vec<_>>();

    let mut failed = 0;
    for result in results {
        match result {
            Ok(output) => println!("{output}"),
            Err(err) => {
                log::error!("{err}");
                failed += 1;
            }
        }
    }

    if failed != 0 {
        anyhow::bail!("{failed} of {} files failed", files.len());
    }

    Ok(())
}
