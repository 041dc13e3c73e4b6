use color_eyre::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install color_eyre and the log subscriber; call once at the top of `main`
pub fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(log_level(std::env::var("RUST_LOG").ok().as_deref()));
    Ok(())
}

/// `RUST_LOG` as a single level; anything unparseable means info
fn log_level(value: Option<&str>) -> Level {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(Level::INFO)
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_env_value() {
        assert_eq!(log_level(Some("debug")), Level::DEBUG);
        assert_eq!(log_level(Some("WARN")), Level::WARN);
        assert_eq!(log_level(Some("snes_link=trace")), Level::INFO);
        assert_eq!(log_level(None), Level::INFO);
    }
}
