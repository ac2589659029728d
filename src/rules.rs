//! Placement rules for newly managed windows.

use crate::tag::TagMask;

/// Workspace defaults a rule may rebind when it matches an aliased class.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct WorkspaceOverride {
    pub caps: Option<[u32; 2]>,
    pub vf: Option<f32>,
    pub show_bar: Option<bool>,
    pub layout: Option<usize>,
}

/// Match on substrings of WM_CLASS class / instance and the window title.
/// An absent pattern matches anything.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Rule {
    pub class: Option<&'static str>,
    pub instance: Option<&'static str>,
    pub title: Option<&'static str>,
    pub tags: TagMask,
    pub floating: bool,
    pub monitor: Option<usize>,
    pub workspace: Option<WorkspaceOverride>,
}

impl Rule {
    fn matches(&self, class: &str, instance: &str, title: &str) -> bool {
        let hit = |pat: Option<&str>, s: &str| pat.map_or(true, |p| s.contains(p));
        hit(self.class, class) && hit(self.instance, instance) && hit(self.title, title)
    }
}

/// The identifying properties of a window being managed.
#[derive(Debug, Clone, Copy)]
pub struct WindowProps<'a> {
    pub class: &'a str,
    pub instance: &'a str,
    pub title: &'a str,
}

/// What the rule table decided. `None` fields were left alone by every rule.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct RuleOutcome {
    pub tags: TagMask,
    pub floating: Option<bool>,
    pub monitor: Option<usize>,
    pub workspace: Option<WorkspaceOverride>,
}

/// Run every rule in order. Matching rules OR their tags together while
/// later ones override floating state, monitor and workspace defaults.
///
/// The class is first looked up in `aliases`; rules see the aliased name and
/// workspace overrides only take effect for aliased classes.
pub fn apply_rules(rules: &[Rule], aliases: &[(&str, &str)], props: WindowProps<'_>) -> RuleOutcome {
    let alias = aliases
        .iter()
        .find(|(raw, _)| *raw == props.class)
        .map(|&(_, canonical)| canonical);
    let class = alias.unwrap_or(props.class);

    let mut outcome = RuleOutcome::default();
    for rule in rules.iter().filter(|r| r.matches(class, props.instance, props.title)) {
        debug!("rule {:?} matched class={} instance={}", rule, class, props.instance);
        outcome.tags |= rule.tags;
        outcome.floating = Some(rule.floating);
        if rule.monitor.is_some() {
            outcome.monitor = rule.monitor;
        }
        if alias.is_some() && rule.workspace.is_some() {
            outcome.workspace = rule.workspace;
        }
    }
    outcome
}
