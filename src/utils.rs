use std::fmt::Display;
use std::time::Instant;

use console::Style;
use indicatif::ProgressStyle;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

pub(crate) fn get_style_main() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=>-"))
}

pub(crate) fn get_style_task() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.blue} {msg}")?)
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, with progress bars
/// attached to task spans.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init()?;

    Ok(())
}

/// Expresses the site path `target` relative to the directory containing the
/// site path `base`. Both paths start at the site root, a trailing `/` marks a
/// directory. Query and fragment suffixes of `target` are kept.
pub(crate) fn relative_url(base: &str, target: &str) -> String {
    let split = target.find(['?', '#']).unwrap_or(target.len());
    let (path, suffix) = target.split_at(split);

    // Directory segments of the base, the file name is dropped.
    let mut from: Vec<&str> = base.trim_start_matches('/').split('/').collect();
    from.pop();
    let from: Vec<&str> = from.into_iter().filter(|s| !s.is_empty()).collect();

    let into: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let (dirs, file) = into.split_at(into.len() - 1);
    let dirs: Vec<&str> = dirs.iter().copied().filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(dirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat_n("..", from.len() - common));
    parts.extend(&dirs[common..]);
    parts.push(file[0]);

    let mut url = parts.join("/");

    if url.is_empty() {
        url.push_str("./");
    }

    url.push_str(suffix);
    url
}
