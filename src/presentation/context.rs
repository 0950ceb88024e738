//! Context scaffolding mounted around a resolved page.
//!
//! Each scope owns one capability (page data, session, settings, ...) with its own init and
//! teardown. Scopes initialise in order and tear down in reverse.

use crate::model::{Location, Props, ThemeId, User, ViewHandle};
use anyhow::{Context as _, Result};

/// What a scope gets to see when the page mounts.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub location: Option<&'a Location>,
    pub view: &'a ViewHandle,
    pub props: &'a Props,
    pub theme: ThemeId,
    pub user: Option<&'a User>,
}

pub trait ContextScope: Send {
    fn name(&self) -> &str;
    fn init(&mut self, page: &PageContext<'_>) -> Result<()>;
    fn teardown(&mut self);
}

/// Holds the props of the mounted page.
#[derive(Debug, Default)]
pub struct PageDataScope {
    props: Option<Props>,
}

impl PageDataScope {
    pub fn props(&self) -> Option<&Props> {
        self.props.as_ref()
    }
}

impl ContextScope for PageDataScope {
    fn name(&self) -> &str {
        "page-data"
    }

    fn init(&mut self, page: &PageContext<'_>) -> Result<()> {
        self.props = Some(page.props.clone());
        Ok(())
    }

    fn teardown(&mut self) {
        self.props = None;
    }
}

#[derive(Debug, Default)]
pub struct SessionScope {
    user: Option<User>,
}

impl ContextScope for SessionScope {
    fn name(&self) -> &str {
        "session"
    }

    fn init(&mut self, page: &PageContext<'_>) -> Result<()> {
        self.user = page.user.cloned();
        Ok(())
    }

    fn teardown(&mut self) {
        self.user = None;
    }
}

#[derive(Debug, Default)]
pub struct SettingsScope {
    theme: Option<ThemeId>,
}

impl ContextScope for SettingsScope {
    fn name(&self) -> &str {
        "settings"
    }

    fn init(&mut self, page: &PageContext<'_>) -> Result<()> {
        self.theme = Some(page.theme);
        Ok(())
    }

    fn teardown(&mut self) {
        self.theme = None;
    }
}

/// Scope with no state of its own (modal stack, dialogs, search, ...).
#[derive(Debug)]
pub struct NamedScope {
    name: &'static str,
    active: bool,
}

impl NamedScope {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            active: false,
        }
    }
}

impl ContextScope for NamedScope {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&mut self, _page: &PageContext<'_>) -> Result<()> {
        self.active = true;
        tracing::trace!(scope = self.name, "scope init");
        Ok(())
    }

    fn teardown(&mut self) {
        self.active = false;
        tracing::trace!(scope = self.name, "scope teardown");
    }
}

#[derive(Default)]
pub struct ContextStack {
    scopes: Vec<Box<dyn ContextScope>>,
    /// Number of scopes currently initialised, always a prefix of `scopes`.
    active: usize,
    mounted: bool,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scope: impl ContextScope + 'static) -> Self {
        self.scopes.push(Box::new(scope));
        self
    }

    /// The scopes every resolved page runs under.
    pub fn standard() -> Self {
        Self::new()
            .with(PageDataScope::default())
            .with(SessionScope::default())
            .with(SettingsScope::default())
            .with(NamedScope::new("sidebar"))
            .with(NamedScope::new("modal"))
            .with(NamedScope::new("dialog"))
            .with(NamedScope::new("search"))
    }

    pub fn names(&self) -> Vec<String> {
        self.scopes.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Initialise every scope in order. On failure the scopes already initialised are torn
    /// down again and the stack stays unmounted.
    pub fn mount(&mut self, page: &PageContext<'_>) -> Result<()> {
        if self.mounted {
            self.unmount();
        }
        for idx in 0..self.scopes.len() {
            let scope = &mut self.scopes[idx];
            if let Err(e) = scope.init(page) {
                let name = scope.name().to_string();
                self.active = idx;
                self.teardown_active();
                return Err(e).with_context(|| format!("context scope {name} failed to initialise"));
            }
            self.active = idx + 1;
        }
        self.mounted = true;
        Ok(())
    }

    pub fn unmount(&mut self) {
        self.teardown_active();
        self.mounted = false;
    }

    fn teardown_active(&mut self) {
        while self.active > 0 {
            self.active -= 1;
            self.scopes[self.active].teardown();
        }
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Logs init/teardown into a shared journal; optionally fails init.
    struct Probe {
        name: &'static str,
        fail: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl ContextScope for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self, _page: &PageContext<'_>) -> Result<()> {
            if self.fail {
                anyhow::bail!("{} unavailable", self.name);
            }
            self.journal.lock().unwrap().push(format!("+{}", self.name));
            Ok(())
        }

        fn teardown(&mut self) {
            self.journal.lock().unwrap().push(format!("-{}", self.name));
        }
    }

    fn stack(journal: &Arc<Mutex<Vec<String>>>, failing: Option<&str>) -> ContextStack {
        ["a", "b", "c"].into_iter().fold(ContextStack::new(), |s, name| {
            s.with(Probe {
                name,
                fail: failing == Some(name),
                journal: journal.clone(),
            })
        })
    }

    fn page<'a>(view: &'a ViewHandle, props: &'a Props) -> PageContext<'a> {
        PageContext {
            location: None,
            view,
            props,
            theme: ThemeId::Light,
            user: None,
        }
    }

    #[test]
    fn mounts_in_order_and_unmounts_in_reverse() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let view = ViewHandle::new("Teams");
        let props = Props::new();
        {
            let mut s = stack(&journal, None);
            s.mount(&page(&view, &props)).unwrap();
            assert!(s.is_mounted());
        }
        assert_eq!(*journal.lock().unwrap(), ["+a", "+b", "+c", "-c", "-b", "-a"]);
    }

    #[test]
    fn failed_init_rolls_back() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let view = ViewHandle::new("Teams");
        let props = Props::new();
        let mut s = stack(&journal, Some("c"));

        let err = s.mount(&page(&view, &props)).unwrap_err();
        assert!(format!("{err:#}").contains("c unavailable"));
        assert!(!s.is_mounted());
        assert_eq!(*journal.lock().unwrap(), ["+a", "+b", "-b", "-a"]);

        drop(s);
        assert_eq!(journal.lock().unwrap().len(), 4);
    }

    #[test]
    fn page_data_scope_holds_props_while_mounted() {
        let view = ViewHandle::new("Teams");
        let mut props = Props::new();
        props.insert("team".into(), serde_json::json!("core"));

        let mut scope = PageDataScope::default();
        scope.init(&page(&view, &props)).unwrap();
        assert_eq!(scope.props(), Some(&props));
        scope.teardown();
        assert!(scope.props().is_none());
    }

    #[test]
    fn standard_stack_has_data_scope_first() {
        let names = ContextStack::standard().names();
        assert_eq!(names.first().map(String::as_str), Some("page-data"));
        assert!(names.contains(&"session".to_string()));
    }
}
