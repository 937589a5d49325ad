//! Log backend setup shared by the command line tools

use log::LevelFilter;

/// Install `env_logger` on stderr at `level`; `RUST_LOG` may refine it.
/// Later calls are ignored.
pub fn init(level: LevelFilter) {
    let _ = builder(level).try_init();
}

fn builder(level: LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false);
    builder
}

/// Map `-v`/`-q` style flags to a level filter
pub fn level_from_flags(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(level_from_flags(0, false), LevelFilter::Warn);
        assert_eq!(level_from_flags(1, false), LevelFilter::Info);
        assert_eq!(level_from_flags(5, false), LevelFilter::Trace);
        assert_eq!(level_from_flags(3, true), LevelFilter::Error);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Warn);
        init(LevelFilter::Debug);
        assert!(log::max_level() >= LevelFilter::Warn);
    }
}
