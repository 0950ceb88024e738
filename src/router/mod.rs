//! Path resolution: maps a pathname to the page that handles it.
//!
//! The route table is an ordered list of segment-prefix rules, frozen once built.

pub mod loader;

use crate::model::ViewHandle;
use loader::PageLoader;
use std::fmt;
use std::sync::Arc;

pub const ACCOUNT_DELETE: &str = "AccountDelete";
pub const DESKTOP_LOGIN: &str = "DesktopLogin";

/// A page: what to render and, optionally, what to load first.
#[derive(Clone)]
pub struct PageDescriptor {
    pub component: ViewHandle,
    pub loader: Option<Arc<dyn PageLoader>>,
}

impl PageDescriptor {
    pub fn new(component: ViewHandle) -> Self {
        Self {
            component,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn PageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("component", &self.component)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct RouteRule {
    path: String,
    segments: Vec<String>,
    descriptor: PageDescriptor,
}

impl RouteRule {
    fn matches(&self, parts: &[&str]) -> bool {
        self.segments.len() <= parts.len()
            && self
                .segments
                .iter()
                .zip(parts)
                .all(|(want, got)| want == got)
    }
}

/// Segments after the leading slash: `/account/delete` -> `["account", "delete"]`.
fn split_segments(pathname: &str) -> Vec<&str> {
    pathname.split('/').skip(1).collect()
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// The built-in pages.
    pub fn defaults() -> RouteTableBuilder {
        Self::builder()
            .route(
                "/account/delete",
                PageDescriptor::new(ViewHandle::new(ACCOUNT_DELETE)),
            )
            .route(
                "/desktop/login",
                PageDescriptor::new(ViewHandle::new(DESKTOP_LOGIN)),
            )
    }

    /// First rule whose segments prefix the pathname, or `None` for not-found.
    pub fn resolve(&self, pathname: &str) -> Option<&PageDescriptor> {
        let parts = split_segments(pathname);
        self.rules
            .iter()
            .find(|rule| rule.matches(&parts))
            .map(|rule| &rule.descriptor)
    }

    /// Registered paths in match order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    rules: Vec<RouteRule>,
}

impl RouteTableBuilder {
    /// Append a rule. Earlier rules win over later ones.
    pub fn route(mut self, path: &str, descriptor: PageDescriptor) -> Self {
        let segments = split_segments(path)
            .into_iter()
            .map(str::to_string)
            .collect();
        self.rules.push(RouteRule {
            path: path.to_string(),
            segments,
            descriptor,
        });
        self
    }

    pub fn build(self) -> RouteTable {
        RouteTable { rules: self.rules }
    }
}

#[cfg(test)]
mod tests {
    use super::loader::FixtureLoader;
    use super::*;

    fn component(table: &RouteTable, path: &str) -> Option<String> {
        table
            .resolve(path)
            .map(|d| d.component.name().to_string())
    }

    #[test]
    fn resolves_builtin_table() {
        let table = RouteTable::defaults().build();
        let cases = [
            ("/account/delete", Some(ACCOUNT_DELETE)),
            ("/account/delete/confirm", Some(ACCOUNT_DELETE)),
            ("/desktop/login", Some(DESKTOP_LOGIN)),
            ("/account", None),
            ("/account/settings", None),
            ("/desktop", None),
            ("/unknown/xyz", None),
            ("/", None),
            ("", None),
            ("/Account/Delete", None),
        ];
        for (path, want) in cases {
            assert_eq!(component(&table, path).as_deref(), want, "path {path:?}");
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = RouteTable::builder()
            .route("/teams/overview", PageDescriptor::new(ViewHandle::new("Overview")))
            .route("/teams", PageDescriptor::new(ViewHandle::new("Teams")))
            .build();
        assert_eq!(component(&table, "/teams/overview").as_deref(), Some("Overview"));
        assert_eq!(component(&table, "/teams/members").as_deref(), Some("Teams"));
        assert_eq!(table.paths().collect::<Vec<_>>(), ["/teams/overview", "/teams"]);
    }

    #[test]
    fn extending_defaults_keeps_builtin_pages() {
        let table = RouteTable::defaults()
            .route(
                "/teams/overview",
                PageDescriptor::new(ViewHandle::new("Overview"))
                    .with_loader(Arc::new(FixtureLoader::default())),
            )
            .build();
        assert_eq!(table.len(), 3);
        assert!(table.resolve("/account/delete").unwrap().loader.is_none());
        assert!(table.resolve("/teams/overview").unwrap().loader.is_some());
    }
}
