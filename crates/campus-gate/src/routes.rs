//! Screen route table
//!
//! Maps request paths to the roles allowed to see them and turns a request
//! into a gate decision. Public screens bypass the gate, the root forwards to
//! the caller's landing screen and unknown paths bounce to the root.

use crate::gate::{self, GateDecision, GateInput, APPROVAL_WAITING_PATH, LOGIN_PATH, ROOT_PATH};
use crate::types::{ProfileState, Role};
use serde::Serialize;

/// Roles allowed on student screens
pub const STUDENT_ONLY: &[Role] = &[Role::Student];

/// Roles allowed on teacher screens; admins may use them too
pub const STAFF: &[Role] = &[Role::Teacher, Role::Admin];

/// Roles allowed on admin screens
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Who may see a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Rendered for everyone, signed in or not
    Public,
    /// Subject to the gate with this permitted-role set
    Gated(&'static [Role]),
}

/// A routable screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Screen {
    /// Normalized path
    pub path: &'static str,
    /// Access rule
    pub access: Access,
}

impl Screen {
    /// Create public screen
    #[inline]
    #[must_use]
    pub const fn public(path: &'static str) -> Self {
        Self {
            path,
            access: Access::Public,
        }
    }

    /// Create gated screen
    #[inline]
    #[must_use]
    pub const fn gated(path: &'static str, permitted: &'static [Role]) -> Self {
        Self {
            path,
            access: Access::Gated(permitted),
        }
    }

    /// Decide for this screen
    #[must_use]
    pub fn decide(&self, authenticated: bool, profile: &ProfileState) -> GateDecision {
        match self.access {
            Access::Public => GateDecision::Render,
            Access::Gated(permitted) => {
                gate::evaluate(&GateInput::new(authenticated, profile).permitting(permitted))
            }
        }
    }
}

/// Result of looking a path up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch<'a> {
    /// A registered screen
    Screen(&'a Screen),
    /// The application root
    Root,
    /// Nothing registered at this path
    Unmatched,
}

const STANDARD_SCREENS: &[Screen] = &[
    Screen::public(LOGIN_PATH),
    Screen::public("/register"),
    Screen::public(APPROVAL_WAITING_PATH),
    Screen::gated("/student-dashboard", STUDENT_ONLY),
    Screen::gated("/student/achievements", STUDENT_ONLY),
    Screen::gated("/student/announcements", STUDENT_ONLY),
    Screen::gated("/student/grades", STUDENT_ONLY),
    Screen::gated("/student/attendance", STUDENT_ONLY),
    Screen::gated("/student/medical-certificates", STUDENT_ONLY),
    Screen::gated("/teacher-dashboard", STAFF),
    Screen::gated("/teacher/student-records", STAFF),
    Screen::gated("/teacher/grades", STAFF),
    Screen::gated("/teacher/attendance", STAFF),
    Screen::gated("/teacher/announcements", STAFF),
    Screen::gated("/teacher/achievements", STAFF),
    Screen::gated("/teacher/medical-certificates", STAFF),
    Screen::gated("/admin-dashboard", ADMIN_ONLY),
    Screen::gated("/admin/analytics", ADMIN_ONLY),
    Screen::gated("/admin/users", ADMIN_ONLY),
    Screen::gated("/admin/achievements", ADMIN_ONLY),
    Screen::gated("/admin/medical-certificates", ADMIN_ONLY),
];

/// Ordered set of screens
#[derive(Debug, Clone)]
pub struct RouteTable {
    screens: Vec<Screen>,
}

impl RouteTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            screens: Vec::new(),
        }
    }

    /// The application's screen set
    #[must_use]
    pub fn standard() -> Self {
        Self {
            screens: STANDARD_SCREENS.to_vec(),
        }
    }

    /// Register a screen, replacing any screen at the same path
    pub fn register(&mut self, screen: Screen) {
        match self.screens.iter_mut().find(|s| s.path == screen.path) {
            Some(existing) => *existing = screen,
            None => self.screens.push(screen),
        }
    }

    /// Iterate registered screens
    pub fn screens(&self) -> impl Iterator<Item = &Screen> {
        self.screens.iter()
    }

    /// Number of registered screens
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.screens.len()
    }

    /// Check if no screens are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    /// Look a request path up
    #[must_use]
    pub fn lookup(&self, path: &str) -> RouteMatch<'_> {
        let path = normalize(path);
        if path == ROOT_PATH {
            return RouteMatch::Root;
        }
        self.screens
            .iter()
            .find(|s| s.path == path)
            .map_or(RouteMatch::Unmatched, RouteMatch::Screen)
    }

    /// Decide what a request for `path` does
    #[must_use]
    pub fn resolve(&self, path: &str, authenticated: bool, profile: &ProfileState) -> GateDecision {
        let decision = match self.lookup(path) {
            RouteMatch::Screen(screen) => screen.decide(authenticated, profile),
            RouteMatch::Root => gate::landing(authenticated, profile),
            RouteMatch::Unmatched => GateDecision::Redirect(ROOT_PATH),
        };
        tracing::debug!(path, %decision, "resolved route");
        decision
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Strip query, fragment and trailing slashes
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionProfile;
    use chrono::Utc;

    fn approved(role: Role) -> ProfileState {
        ProfileState::Present(
            SessionProfile::new("u", "u@campus.edu", "U", role, Utc::now()).with_approved(true),
        )
    }

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/admin/users/"), "/admin/users");
        assert_eq!(normalize("/student/grades?term=2"), "/student/grades");
        assert_eq!(normalize("/login#top"), "/login");
    }

    #[test]
    fn standard_table_shape() {
        let table = RouteTable::standard();
        assert_eq!(table.len(), 21);
        assert!(matches!(table.lookup("/"), RouteMatch::Root));
        assert!(matches!(table.lookup("/nowhere"), RouteMatch::Unmatched));
        match table.lookup("/teacher/grades") {
            RouteMatch::Screen(screen) => assert_eq!(screen.access, Access::Gated(STAFF)),
            other => panic!("unexpected match: {other:?}"),
        }
    }

    #[test]
    fn public_screens_render_without_identity() {
        let table = RouteTable::standard();
        for path in ["/login", "/register", "/approval-waiting"] {
            assert_eq!(
                table.resolve(path, false, &ProfileState::Absent),
                GateDecision::Render
            );
        }
    }

    #[test]
    fn admin_may_use_teacher_screens() {
        let table = RouteTable::standard();
        assert_eq!(
            table.resolve("/teacher/attendance", true, &approved(Role::Admin)),
            GateDecision::Render
        );
        assert_eq!(
            table.resolve("/admin/analytics", true, &approved(Role::Teacher)),
            GateDecision::Redirect("/teacher-dashboard")
        );
    }

    #[test]
    fn unknown_path_goes_to_root() {
        let table = RouteTable::standard();
        assert_eq!(
            table.resolve("/does/not/exist", true, &approved(Role::Student)),
            GateDecision::Redirect(ROOT_PATH)
        );
    }

    #[test]
    fn root_forwards_to_dashboard() {
        let table = RouteTable::standard();
        assert_eq!(
            table.resolve("/", true, &approved(Role::Student)),
            GateDecision::Redirect("/student-dashboard")
        );
    }

    #[test]
    fn register_replaces_existing_path() {
        let mut table = RouteTable::new();
        table.register(Screen::gated("/reports", STAFF));
        table.register(Screen::gated("/reports", ADMIN_ONLY));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.resolve("/reports", true, &approved(Role::Teacher)),
            GateDecision::Redirect("/teacher-dashboard")
        );
    }
}
