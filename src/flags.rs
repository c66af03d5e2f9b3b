//! Path-filtered flag composition with `$source`/`$output`/`$relative`
//! templating.

use crate::config::BuildConfig;
use std::path::Path;

/// Substitutes `$source`, `$output` and (if given) `$relative` in `template`
/// with the corresponding paths.
fn substitute(template: &str, config: &BuildConfig, relative: Option<&Path>) -> String {
    let mut out = template.replace("$source", &config.source_root.to_string_lossy());
    out = out.replace("$output", &config.build_output.to_string_lossy());
    if let Some(rel) = relative {
        out = out.replace("$relative", &rel.to_string_lossy());
    }
    out
}

/// Appends flags for files whose path matches a glob, after templating.
pub struct AddFlags {
    pub match_glob: Option<String>,
    pub flags: Vec<String>,
}

impl AddFlags {
    pub fn new(match_glob: impl Into<String>, flags: Vec<String>) -> Self {
        Self { match_glob: Some(match_glob.into()), flags }
    }

    /// Applies unconditionally (no match filter).
    pub fn always(flags: Vec<String>) -> Self {
        Self { match_glob: None, flags }
    }

    /// Checks whether `fpath` matches our filter and, if so, appends our
    /// (templated) flags to `out`.
    pub fn run(&self, fpath: &Path, out: &mut Vec<String>, config: &BuildConfig) {
        let relative = fpath.parent();

        let matches = match &self.match_glob {
            None => true,
            Some(glob_template) => {
                let rendered = substitute(glob_template, config, relative);
                glob::Pattern::new(&rendered).map(|pat| pat.matches_path(fpath)).unwrap_or(false)
            }
        };

        if matches {
            out.extend(self.flags.iter().map(|f| substitute(f, config, relative)));
        }
    }
}

/// Returns command-line flags for a given path, in a reproducible order:
/// templated `common_flags` first, then each [`AddFlags`] rule applied in
/// declared order.
#[derive(Default)]
pub struct FlagsConfig {
    pub common_flags: Vec<String>,
    pub path_flags: Vec<AddFlags>,
}

impl FlagsConfig {
    pub fn new(common_flags: Vec<String>, path_flags: Vec<AddFlags>) -> Self {
        Self { common_flags, path_flags }
    }

    pub fn flags_for_path(&self, path: &Path, config: &BuildConfig) -> Vec<String> {
        let mut flags: Vec<String> = self.common_flags.iter().map(|f| substitute(f, config, None)).collect();

        for rule in &self.path_flags {
            rule.run(path, &mut flags, config);
        }

        flags
    }
}
