//! SIGINT/SIGTERM handling
//!
//! The first signal sets the cancellation flag: polling and retry sleeps
//! return early, no new operation starts, and the report is still printed.
//! A second SIGINT exits immediately.

use anyhow::{Context, Result};
use dnackit::CancelToken;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Route SIGINT and SIGTERM onto `token`.
pub fn install(token: &CancelToken) -> Result<()> {
    let cancelled = token.flag();
    // order matters: the shutdown check must see the flag before it is set
    flag::register_conditional_shutdown(SIGINT, 130, cancelled.clone())
        .context("Failed to register SIGINT shutdown handler")?;
    for signal in [SIGINT, SIGTERM] {
        flag::register(signal, cancelled.clone())
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigterm_cancels_token() {
        let token = CancelToken::new();
        install(&token).unwrap();
        assert!(!token.is_cancelled());

        signal_hook::low_level::raise(SIGTERM).unwrap();
        assert!(token.is_cancelled());
    }
}
