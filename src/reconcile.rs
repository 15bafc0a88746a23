//! Undoing disambiguation suffixes that turned out to be unnecessary.
//!
//! While a batch runs, two images that resolve to the same name get `张三`
//! and `张三_1`. If the bare name is later freed (or was never taken because
//! the other image failed), `张三_1` can go back to being `张三`. We do this
//! in two steps: [`plan_reconciliation`] works on a snapshot of file names
//! and touches nothing, then [`execute_plan`] performs the renames.

use std::{collections::BTreeSet, fs};

use schemars::JsonSchema;

use crate::{
    naming::{list_images, split_file_name},
    prelude::*,
};

/// One planned rename.
#[derive(Clone, Debug, JsonSchema, PartialEq, Eq, Serialize)]
pub struct Restore {
    /// The suffixed name.
    pub from: String,
    /// The bare name it goes back to.
    pub to: String,
}

/// If `file_name` looks like `base_N.ext` with a non-empty `base` and an
/// all-digit `N`, return `base.ext`.
pub fn unsuffixed_name(file_name: &str) -> Option<(String, &str)> {
    let (stem, ext) = split_file_name(file_name);
    let (base, suffix) = stem.rsplit_once('_')?;
    let numeric = !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit());
    if base.is_empty() || !numeric {
        return None;
    }
    Some((format!("{base}{ext}"), base))
}

/// Plan which suffixed files can go back to their bare names.
///
/// Files are visited in sorted order, so when `张三_1` and `张三_2` both
/// compete for `张三`, `张三_1` wins. We keep planning against the simulated
/// result until nothing changes, which means that reconciling an already
/// reconciled folder is a no-op.
///
/// Names whose base is exactly `fallback_label` are left alone: in
/// `未识别_3`, the number is a counter, not a disambiguation suffix.
pub fn plan_reconciliation<S>(file_names: &[S], fallback_label: &str) -> Vec<Restore>
where
    S: AsRef<str>,
{
    let mut folder = file_names
        .iter()
        .map(|name| name.as_ref().to_owned())
        .collect::<BTreeSet<_>>();
    let mut plan = vec![];
    loop {
        let mut restores = vec![];
        let snapshot = folder.clone();
        for name in &snapshot {
            let Some((bare, base)) = unsuffixed_name(name) else {
                continue;
            };
            if base == fallback_label || folder.contains(&bare) {
                continue;
            }
            folder.remove(name);
            folder.insert(bare.clone());
            restores.push(Restore {
                from: name.clone(),
                to: bare,
            });
        }
        if restores.is_empty() {
            return plan;
        }
        plan.extend(restores);
    }
}

/// Perform planned renames in order. A rename whose target exists by the
/// time we get to it is skipped, never forced, and a rename that fails is
/// logged and skipped. Returns the renames we made.
pub fn execute_plan(folder: &Path, plan: Vec<Restore>) -> Vec<Restore> {
    let mut done = vec![];
    for restore in plan {
        let from = folder.join(&restore.from);
        let to = folder.join(&restore.to);
        if to.exists() {
            warn!(from = %restore.from, to = %restore.to, "Target exists, not restoring");
            continue;
        }
        if let Err(err) = fs::rename(&from, &to) {
            warn!(from = %restore.from, to = %restore.to, "Could not restore: {err}");
            continue;
        }
        info!(from = %restore.from, to = %restore.to, "Restored");
        done.push(restore);
    }
    done
}

/// Reconcile the image files in `folder`.
#[instrument(level = "debug", skip_all, fields(folder = %folder.display()))]
pub fn reconcile(folder: &Path, fallback_label: &str) -> Result<Vec<Restore>> {
    let names = list_images(folder)?;
    let plan = plan_reconciliation(&names, fallback_label);
    debug!(planned = plan.len(), "Planned restores");
    Ok(execute_plan(folder, plan))
}
