//! Topic identity and reconciliation scope.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PERSISTENT_PREFIX: &str = "persistent://";
const PARTITION_SUFFIX: &str = "-partition-";

/// Identity of a persistent topic or one partition of it.
///
/// Ordering is by namespace, then local name, then partition, which keeps
/// every map keyed by `TopicRef` in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TopicRef {
    namespace: String,
    name: String,
    partition: Option<u32>,
}

impl TopicRef {
    /// Build a topic reference from a `tenant/namespace` pair and a local name.
    ///
    /// A `-partition-N` suffix on `name` is split off into the partition index.
    pub fn new(namespace: impl Into<String>, name: impl AsRef<str>) -> Result<Self, ParseTopicError> {
        let namespace = namespace.into();
        let mut parts = namespace.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(ns), None) if !t.is_empty() && !ns.is_empty() => {}
            _ => return Err(ParseTopicError::new(&namespace, "namespace must be tenant/namespace")),
        }

        let (name, partition) = split_partition(name.as_ref());
        if name.is_empty() || name.contains('/') {
            return Err(ParseTopicError::new(name, "invalid local topic name"));
        }

        Ok(Self {
            namespace,
            name: name.to_string(),
            partition,
        })
    }

    /// `tenant/namespace`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn tenant(&self) -> &str {
        self.namespace.split('/').next().unwrap_or_default()
    }

    /// Local name without the partition suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition(&self) -> Option<u32> {
        self.partition
    }

    /// The partitioned topic this is a partition of; itself when unpartitioned.
    pub fn base(&self) -> TopicRef {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            partition: None,
        }
    }

    /// Local name as the serving layer knows it, including any partition suffix.
    pub fn local_name(&self) -> String {
        match self.partition {
            Some(p) => format!("{}{}{}", self.name, PARTITION_SUFFIX, p),
            None => self.name.clone(),
        }
    }

    /// Managed-ledger name, `tenant/namespace/persistent/<encoded local name>`.
    pub fn managed_ledger_name(&self) -> String {
        format!(
            "{}/persistent/{}",
            self.namespace,
            urlencoding::encode(&self.local_name())
        )
    }

    /// Path of the managed-ledger node in the coordination store.
    pub fn managed_ledger_path(&self) -> String {
        format!("/managed-ledgers/{}", self.managed_ledger_name())
    }

    /// Path segment used by the admin REST API, `tenant/namespace/<encoded local name>`.
    pub fn admin_path(&self) -> String {
        format!(
            "{}/{}",
            self.namespace,
            urlencoding::encode(&self.local_name())
        )
    }

    /// Parse a managed-ledger name as found in ledger custom metadata.
    pub fn from_managed_ledger_name(ml_name: &str) -> Result<Self, ParseTopicError> {
        let parts: Vec<&str> = ml_name.splitn(4, '/').collect();
        match parts.as_slice() {
            [tenant, ns, "persistent", encoded] => {
                let local = urlencoding::decode(encoded)
                    .map_err(|_| ParseTopicError::new(ml_name, "local name is not valid UTF-8"))?;
                Self::new(format!("{tenant}/{ns}"), &*local)
            }
            _ => Err(ParseTopicError::new(
                ml_name,
                "expected tenant/namespace/persistent/name",
            )),
        }
    }
}

fn split_partition(local: &str) -> (&str, Option<u32>) {
    if let Some(idx) = local.rfind(PARTITION_SUFFIX) {
        let digits = &local[idx + PARTITION_SUFFIX.len()..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(p) = digits.parse() {
                return (&local[..idx], Some(p));
            }
        }
    }
    (local, None)
}

impl fmt::Display for TopicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", PERSISTENT_PREFIX, self.namespace, self.local_name())
    }
}

impl FromStr for TopicRef {
    type Err = ParseTopicError;

    /// Accepts `persistent://tenant/ns/name` or the short form `tenant/ns/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("://") && !s.starts_with(PERSISTENT_PREFIX) {
            return Err(ParseTopicError::new(s, "only persistent topics are supported"));
        }
        let rest = s.strip_prefix(PERSISTENT_PREFIX).unwrap_or(s);
        let parts: Vec<&str> = rest.splitn(3, '/').collect();
        match parts.as_slice() {
            [tenant, ns, local] => Self::new(format!("{tenant}/{ns}"), local),
            _ => Err(ParseTopicError::new(s, "expected tenant/namespace/topic")),
        }
    }
}

impl From<TopicRef> for String {
    fn from(topic: TopicRef) -> Self {
        topic.to_string()
    }
}

impl TryFrom<String> for TopicRef {
    type Error = ParseTopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Error parsing a topic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTopicError {
    input: String,
    reason: &'static str,
}

impl ParseTopicError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl fmt::Display for ParseTopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid topic '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseTopicError {}

/// The part of the cluster a reconciliation run covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Tenant(String),
    /// `tenant/namespace`.
    Namespace(String),
    /// A single topic; a non-partitioned reference also covers its partitions.
    Topic(TopicRef),
}

impl Scope {
    pub fn tenant(&self) -> &str {
        match self {
            Scope::Tenant(t) => t,
            Scope::Namespace(ns) => ns.split('/').next().unwrap_or_default(),
            Scope::Topic(topic) => topic.tenant(),
        }
    }

    /// The single namespace covered, if the scope is narrower than a tenant.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Tenant(_) => None,
            Scope::Namespace(ns) => Some(ns),
            Scope::Topic(topic) => Some(topic.namespace()),
        }
    }

    /// Whether `topic` falls within this scope.
    pub fn contains(&self, topic: &TopicRef) -> bool {
        match self {
            Scope::Tenant(t) => topic.tenant() == t,
            Scope::Namespace(ns) => topic.namespace() == ns,
            Scope::Topic(scoped) => {
                scoped.namespace() == topic.namespace()
                    && scoped.name() == topic.name()
                    && (scoped.partition().is_none() || scoped.partition() == topic.partition())
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Tenant(t) => write!(f, "{t}"),
            Scope::Namespace(ns) => write!(f, "{ns}"),
            Scope::Topic(topic) => write!(f, "{topic}"),
        }
    }
}

impl FromStr for Scope {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("://") {
            return s.parse().map(Scope::Topic);
        }
        let trimmed = s.trim_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ParseTopicError::new(s, "empty scope segment"));
        }
        match parts.len() {
            1 => Ok(Scope::Tenant(trimmed.to_string())),
            2 => Ok(Scope::Namespace(trimmed.to_string())),
            3 => trimmed.parse().map(Scope::Topic),
            _ => Err(ParseTopicError::new(
                s,
                "expected tenant, tenant/namespace or a topic name",
            )),
        }
    }
}
