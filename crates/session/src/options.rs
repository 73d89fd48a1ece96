use log::warn;
use sessionkit_core::{Host, OptionMap, OptionScope, OptionTarget};

fn scope_of(target: OptionTarget) -> OptionScope {
    match target {
        OptionTarget::Global => OptionScope::Global,
        OptionTarget::Tab(_) => OptionScope::Tab,
        OptionTarget::Buffer(_) => OptionScope::Buffer,
        OptionTarget::Window(_) => OptionScope::Window,
    }
}

/// 擷取符合範圍的選項。 / Snapshots the options in `names` that live in `target`'s
/// scope. Names the host does not know are ignored.
pub fn capture_options(host: &dyn Host, names: &[String], target: OptionTarget) -> OptionMap {
    let scope = scope_of(target);
    names
        .iter()
        .filter(|name| host.option_scope(name) == Some(scope))
        .filter_map(|name| {
            host.get_option(target, name)
                .map(|value| (name.clone(), value))
        })
        .collect()
}

/// Applies saved options, logging and skipping any the host refuses. Returns the
/// number of options that failed.
pub fn apply_options(host: &mut dyn Host, target: OptionTarget, options: &OptionMap) -> usize {
    let mut failed = 0;
    for (name, value) in options {
        if let Err(err) = host.set_option(target, name, value.clone()) {
            warn!("could not restore option {name}: {err}");
            failed += 1;
        }
    }
    failed
}
