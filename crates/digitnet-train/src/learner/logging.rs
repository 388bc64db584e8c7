use std::path::Path;
use tracing_core::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// If a global tracing subscriber is not already configured, set up logging to a file,
/// and add our custom panic hook.
///
/// Returns whether the file logger was installed.
pub fn install_file_logger<P: AsRef<Path>>(file_path: P) -> bool {
    let path = file_path.as_ref();
    let Some(file_name) = path.file_name() else {
        log::warn!("Not logging to '{}', the path does not name a file", path.display());
        return false;
    };

    let writer = tracing_appender::rolling::never(
        path.parent().unwrap_or_else(|| Path::new(".")),
        file_name,
    );
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO);

    if registry().with(layer).try_init().is_ok() {
        update_panic_hook(path);
        return true;
    }

    false
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the training logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
