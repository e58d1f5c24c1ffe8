//! Query key space.
//!
//! A `QueryKey` names one cached collection or record: an entity kind, an
//! optional scope anchoring it to a single entity or relationship, and a set
//! of list filters. Keys are plain values; the store only hashes and compares
//! them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Category of managed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Users,
    CurrentUser,
    Projects,
    Activities,
    Skills,
    UserSkills,
    Resources,
    WorkLogs,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Users,
        EntityKind::CurrentUser,
        EntityKind::Projects,
        EntityKind::Activities,
        EntityKind::Skills,
        EntityKind::UserSkills,
        EntityKind::Resources,
        EntityKind::WorkLogs,
    ];

    /// Name used in key display and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::CurrentUser => "currentUser",
            EntityKind::Projects => "projects",
            EntityKind::Activities => "activities",
            EntityKind::Skills => "skills",
            EntityKind::UserSkills => "userSkills",
            EntityKind::Resources => "resources",
            EntityKind::WorkLogs => "workLogs",
        }
    }

    /// Parse a kind from its configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filter value in a list key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    fn is_blank(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Filters of a list key. Ordered, so equality and hashing ignore insertion order.
pub type Params = BTreeMap<String, ParamValue>;

/// Anchors a key to one entity (`id=7`) or one relationship owner (`userId=3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Scope {
    pub field: &'static str,
    pub id: i64,
}

impl Scope {
    pub fn id(id: i64) -> Self {
        Self { field: "id", id }
    }

    pub fn user(user_id: i64) -> Self {
        Self {
            field: "userId",
            id: user_id,
        }
    }

    pub fn project(project_id: i64) -> Self {
        Self {
            field: "projectId",
            id: project_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    kind: EntityKind,
    scope: Option<Scope>,
    params: Params,
}

/// Build a key. Absent params and params that are empty after dropping blank
/// values produce the same key.
pub fn key_for(kind: EntityKind, scope: Option<Scope>, params: Option<Params>) -> QueryKey {
    let params = params
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, value)| !value.is_blank())
        .collect();
    QueryKey {
        kind,
        scope,
        params,
    }
}

impl QueryKey {
    /// The unfiltered list of a kind.
    pub fn list(kind: EntityKind) -> Self {
        key_for(kind, None, None)
    }

    /// A list narrowed by filters.
    pub fn filtered<I, K, V>(kind: EntityKind, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        key_for(kind, None, Some(params))
    }

    /// The detail key of a single entity.
    pub fn detail(kind: EntityKind, id: i64) -> Self {
        key_for(kind, Some(Scope::id(id)), None)
    }

    /// A key anchored to a relationship owner, e.g. `(userSkills, userId=3)`.
    pub fn scoped(kind: EntityKind, scope: Scope) -> Self {
        key_for(kind, Some(scope), None)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// True for the detail key of one entity.
    pub fn is_detail(&self) -> bool {
        matches!(self.scope, Some(Scope { field: "id", .. }))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.kind)?;
        if let Some(scope) = self.scope {
            write!(f, ", {}={}", scope.field, scope.id)?;
        }
        if !self.params.is_empty() {
            let rendered: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, ", {{{}}}", rendered.join(", "))?;
        }
        f.write_str(")")
    }
}

/// What an invalidation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum KeyPattern {
    /// Exactly one key.
    Exact(QueryKey),
    /// Every unscoped key of the kind: the list under any filter.
    Lists(EntityKind),
    /// Every key of the kind.
    Kind(EntityKind),
}

impl KeyPattern {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Lists(kind) => key.kind == *kind && key.scope.is_none(),
            KeyPattern::Kind(kind) => key.kind == *kind,
        }
    }
}

/// A bare list key widens to every list of its kind, so staling `(projects)`
/// also reaches `(projects, {status=active})`. Any other key stays exact.
impl From<QueryKey> for KeyPattern {
    fn from(key: QueryKey) -> Self {
        if key.scope.is_none() && key.params.is_empty() {
            KeyPattern::Lists(key.kind)
        } else {
            KeyPattern::Exact(key)
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Exact(key) => write!(f, "{}", key),
            KeyPattern::Lists(kind) => write!(f, "({}, lists)", kind),
            KeyPattern::Kind(kind) => write!(f, "({}, *)", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_list_and_empty_filter_collide() {
        let all = QueryKey::list(EntityKind::Projects);
        let no_filters = QueryKey::filtered(EntityKind::Projects, Vec::<(String, ParamValue)>::new());
        let blank_filter = QueryKey::filtered(EntityKind::Projects, [("status", "")]);
        let absent = key_for(EntityKind::Projects, None, None);

        assert_eq!(all, no_filters);
        assert_eq!(all, blank_filter);
        assert_eq!(all, absent);
    }

    #[test]
    fn test_detail_keys_differ_by_id_and_kind() {
        let p7 = QueryKey::detail(EntityKind::Projects, 7);
        assert_eq!(p7, QueryKey::detail(EntityKind::Projects, 7));
        assert_ne!(p7, QueryKey::detail(EntityKind::Projects, 8));
        assert_ne!(p7, QueryKey::detail(EntityKind::Users, 7));
        assert_ne!(p7, QueryKey::list(EntityKind::Projects));
        assert!(p7.is_detail());
    }

    #[test]
    fn test_relationship_scope_is_not_detail() {
        let skills = QueryKey::scoped(EntityKind::UserSkills, Scope::user(3));
        assert!(!skills.is_detail());
        assert_ne!(skills, QueryKey::detail(EntityKind::UserSkills, 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryKey::list(EntityKind::Projects).to_string(), "(projects)");
        assert_eq!(
            QueryKey::detail(EntityKind::Projects, 7).to_string(),
            "(projects, id=7)"
        );
        assert_eq!(
            QueryKey::scoped(EntityKind::UserSkills, Scope::user(3)).to_string(),
            "(userSkills, userId=3)"
        );
        assert_eq!(
            QueryKey::filtered(EntityKind::Projects, [("status", "active")]).to_string(),
            "(projects, {status=active})"
        );
    }

    #[test]
    fn test_pattern_matching() {
        let list = QueryKey::list(EntityKind::Projects);
        let active = QueryKey::filtered(EntityKind::Projects, [("status", "active")]);
        let detail = QueryKey::detail(EntityKind::Projects, 7);
        let skills = QueryKey::list(EntityKind::Skills);

        let lists = KeyPattern::Lists(EntityKind::Projects);
        assert!(lists.matches(&list));
        assert!(lists.matches(&active));
        assert!(!lists.matches(&detail));
        assert!(!lists.matches(&skills));

        let kind = KeyPattern::Kind(EntityKind::Projects);
        assert!(kind.matches(&list));
        assert!(kind.matches(&detail));
        assert!(!kind.matches(&skills));

        let exact = KeyPattern::from(detail.clone());
        assert!(exact.matches(&detail));
        assert!(!exact.matches(&QueryKey::detail(EntityKind::Projects, 8)));
    }

    #[test]
    fn test_bare_list_key_widens_to_lists() {
        let list = QueryKey::list(EntityKind::Projects);
        let active = QueryKey::filtered(EntityKind::Projects, [("status", "active")]);

        assert_eq!(KeyPattern::from(list.clone()), KeyPattern::Lists(EntityKind::Projects));
        assert!(KeyPattern::from(list).matches(&active));

        let filtered = KeyPattern::from(active.clone());
        assert_eq!(filtered, KeyPattern::Exact(active));
        assert!(!filtered.matches(&QueryKey::list(EntityKind::Projects)));
    }

    #[test]
    fn test_entity_kind_from_name() {
        assert_eq!(EntityKind::from_name("projects"), Some(EntityKind::Projects));
        assert_eq!(EntityKind::from_name("workLogs"), Some(EntityKind::WorkLogs));
        assert_eq!(EntityKind::from_name("WORKLOGS"), Some(EntityKind::WorkLogs));
        assert_eq!(EntityKind::from_name("nope"), None);
    }

    proptest! {
        #[test]
        fn prop_param_order_does_not_matter(
            params in proptest::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..6)
        ) {
            let forward = QueryKey::filtered(EntityKind::WorkLogs, params.clone());
            // Duplicate names resolve last-wins, so dedupe before comparing.
            let mut dedup = std::collections::BTreeMap::new();
            for (k, v) in &params {
                dedup.insert(k.clone(), *v);
            }
            let canonical = QueryKey::filtered(EntityKind::WorkLogs, dedup.clone());
            let shuffled = QueryKey::filtered(EntityKind::WorkLogs, dedup.into_iter().rev());

            prop_assert_eq!(&forward, &canonical);
            prop_assert_eq!(&canonical, &shuffled);
        }
    }
}
