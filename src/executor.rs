//! Parallel executor.
//!
//! `run_mp` maps a function over a list of items using a worker pool sized
//! by [`BuildConfig::n_procs`], or falls back to strictly sequential
//! execution when multiprocessing is disabled. Each item's outcome is
//! captured as a `Result` rather than allowed to abort its peers — the
//! first failing item does not stop the rest of the wave.

use crate::config::BuildConfig;
use crate::error::{FabError, Result};
use rayon::prelude::*;
use std::fmt;

/// Runs `f` over every item in `items`, in parallel if
/// `config.multiprocessing` is set, otherwise sequentially in the caller.
///
/// The result vector preserves input order. A panicking or erroring item
/// does not prevent its peers from running to completion; errors are
/// reported in-band via the `Result` each call to `f` returns.
pub fn run_mp<T, R, E, F>(config: &BuildConfig, items: Vec<T>, f: F) -> Vec<std::result::Result<R, E>>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
{
    if !config.multiprocessing || items.len() <= 1 {
        return items.into_iter().map(f).collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_procs)
        .build()
        .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().expect("default rayon pool"));

    pool.install(|| items.into_par_iter().map(|item| f(item)).collect())
}

/// Aggregates a batch of per-item results into a single error if any item
/// failed, otherwise `Ok(())`. A left-fold over the batch, per the Design
/// Notes' preferred replacement for runtime type-checked "error or value"
/// lists.
pub fn check_for_errors<R, E: fmt::Display>(results: &[std::result::Result<R, E>], caller_label: &str) -> Result<()> {
    let messages: Vec<String> = results.iter().filter_map(|r| r.as_ref().err()).map(|e| e.to_string()).collect();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(FabError::Step(format!("{caller_label}: {} error(s):\n{}", messages.len(), messages.join("\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(multiprocessing: bool) -> BuildConfig {
        BuildConfig::builder("proj")
            .fab_workspace("/tmp/fab-run-mp-tests")
            .multiprocessing(multiprocessing)
            .n_procs(4)
            .build()
            .unwrap()
    }

    #[test]
    fn preserves_order_sequential() {
        let cfg = config(false);
        let results = run_mp(&cfg, vec![1, 2, 3, 4], |x| Ok::<_, String>(x * 10));
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![10, 20, 30, 40]);
    }

    #[test]
    fn preserves_order_parallel() {
        let cfg = config(true);
        let items: Vec<i32> = (0..200).collect();
        let results = run_mp(&cfg, items.clone(), |x| Ok::<_, String>(x));
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, items);
    }

    #[test]
    fn one_failure_does_not_stop_peers() {
        let cfg = config(true);
        let items: Vec<i32> = (0..20).collect();
        let results = run_mp(&cfg, items, |x| if x == 7 { Err(format!("bad item {x}")) } else { Ok(x) });
        assert_eq!(results.len(), 20);
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 19);
    }

    #[test]
    fn check_for_errors_aggregates_messages() {
        let results: Vec<std::result::Result<i32, String>> =
            vec![Ok(1), Err("boom".into()), Ok(3), Err("bang".into())];
        let err = check_for_errors(&results, "mystep").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("boom"));
        assert!(msg.contains("bang"));
    }

    #[test]
    fn check_for_errors_ok_when_all_succeed() {
        let results: Vec<std::result::Result<i32, String>> = vec![Ok(1), Ok(2)];
        assert!(check_for_errors(&results, "mystep").is_ok());
    }
}
