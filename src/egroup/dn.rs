//! Distinguished-name layout of the directory and classification of
//! `member` values into users and nested groups.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Namespace holding e-groups
pub const GROUP_BASE_DN: &str = "OU=e-groups,OU=Workgroups,DC=cern,DC=ch";

/// Namespace holding user accounts
pub const USER_BASE_DN: &str = "OU=Users,OU=Organic Units,DC=cern,DC=ch";

/// RFC 4514 escape: `\` followed by two hex digits or by the escaped character
static DN_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\([0-9A-Fa-f]{2}|.)").expect("Invalid DN escape regex"));

/// Where groups and users live in the directory tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryLayout {
    pub group_base: String,
    pub user_base: String,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            group_base: GROUP_BASE_DN.to_string(),
            user_base: USER_BASE_DN.to_string(),
        }
    }
}

impl DirectoryLayout {
    pub fn group_dn(&self, name: &str) -> String {
        format!("CN={},{}", escape_rdn_value(name), self.group_base)
    }

    pub fn user_dn(&self, name: &str) -> String {
        format!("CN={},{}", escape_rdn_value(name), self.user_base)
    }
}

/// Escape the characters RFC 4514 reserves inside an attribute value
pub fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == '#' || c == ' ');
        if leading || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Decode `\,` style and `\C3\A9` style escapes back into the plain value
pub fn unescape_rdn_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    let mut bytes = Vec::with_capacity(value.len());
    let mut last = 0;
    for m in DN_ESCAPE.find_iter(value) {
        bytes.extend_from_slice(value[last..m.start()].as_bytes());
        let escaped = &m.as_str()[1..];
        match u8::from_str_radix(escaped, 16) {
            Ok(byte) if escaped.len() == 2 => bytes.push(byte),
            _ => bytes.extend_from_slice(escaped.as_bytes()),
        }
        last = m.end();
    }
    bytes.extend_from_slice(value[last..].as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// What a `member` value points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    User(String),
    Group(String),
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct DnClassifier {
    user: Regex,
    group: Regex,
}

impl DnClassifier {
    pub fn new(layout: &DirectoryLayout) -> Result<Self, regex::Error> {
        Ok(Self {
            user: Self::pattern(&layout.user_base)?,
            group: Self::pattern(&layout.group_base)?,
        })
    }

    fn pattern(base: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!(
            r"(?i)^CN=((?:[^,\\]|\\.)+),{}$",
            regex::escape(base)
        ))
    }

    pub fn classify(&self, dn: &str) -> MemberRef {
        if let Some(caps) = self.user.captures(dn) {
            return MemberRef::User(unescape_rdn_value(&caps[1]));
        }
        if let Some(caps) = self.group.captures(dn) {
            return MemberRef::Group(unescape_rdn_value(&caps[1]));
        }
        MemberRef::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cern_classifier() -> DnClassifier {
        DnClassifier::new(&DirectoryLayout::default()).unwrap()
    }

    #[test]
    fn test_classify_user() {
        let classifier = cern_classifier();
        assert_eq!(
            classifier.classify("CN=alice,OU=Users,OU=Organic Units,DC=cern,DC=ch"),
            MemberRef::User("alice".to_string())
        );
    }

    #[test]
    fn test_classify_group() {
        let classifier = cern_classifier();
        assert_eq!(
            classifier.classify("CN=it-dep,OU=e-groups,OU=Workgroups,DC=cern,DC=ch"),
            MemberRef::Group("it-dep".to_string())
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        let classifier = cern_classifier();
        assert_eq!(
            classifier.classify("CN=svc-build,OU=Externals,DC=cern,DC=ch"),
            MemberRef::Unrecognized
        );
        assert_eq!(
            classifier.classify("CN=alice,OU=Users,OU=Organic Units,DC=cern,DC=ch,DC=extra"),
            MemberRef::Unrecognized
        );
        assert_eq!(classifier.classify(""), MemberRef::Unrecognized);
    }

    #[test]
    fn test_custom_layout_is_escaped() {
        let layout = DirectoryLayout {
            group_base: "OU=Groups (test),DC=example,DC=org".to_string(),
            user_base: "OU=People,DC=example,DC=org".to_string(),
        };
        let classifier = DnClassifier::new(&layout).unwrap();

        assert_eq!(
            classifier.classify(&layout.group_dn("admins")),
            MemberRef::Group("admins".to_string())
        );
        assert_eq!(
            classifier.classify(&layout.user_dn("carol")),
            MemberRef::User("carol".to_string())
        );
        assert_eq!(
            classifier.classify(&DirectoryLayout::default().user_dn("carol")),
            MemberRef::Unrecognized
        );
    }

    #[test]
    fn test_escaped_names_are_decoded() {
        let classifier = cern_classifier();
        assert_eq!(
            classifier.classify(r"CN=Doe\, John,OU=Users,OU=Organic Units,DC=cern,DC=ch"),
            MemberRef::User("Doe, John".to_string())
        );
        assert_eq!(
            classifier.classify(r"CN=caf\C3\A9,OU=e-groups,OU=Workgroups,DC=cern,DC=ch"),
            MemberRef::Group("café".to_string())
        );
    }

    #[test]
    fn test_nested_rdn_is_unrecognized() {
        assert_eq!(
            cern_classifier().classify("CN=a,CN=b,OU=Users,OU=Organic Units,DC=cern,DC=ch"),
            MemberRef::Unrecognized
        );
    }

    #[test]
    fn test_escape_round_trip() {
        let layout = DirectoryLayout::default();
        assert_eq!(
            layout.group_dn("ops,night"),
            r"CN=ops\,night,OU=e-groups,OU=Workgroups,DC=cern,DC=ch"
        );
        assert_eq!(escape_rdn_value("#tag"), r"\#tag");
        assert_eq!(unescape_rdn_value(&escape_rdn_value("a+b=c")), "a+b=c");
        assert_eq!(unescape_rdn_value("plain"), "plain");
    }

    #[test]
    fn test_layout_dns() {
        let layout = DirectoryLayout::default();
        assert_eq!(
            layout.user_dn("bob"),
            "CN=bob,OU=Users,OU=Organic Units,DC=cern,DC=ch"
        );
        assert_eq!(
            layout.group_dn("ops"),
            "CN=ops,OU=e-groups,OU=Workgroups,DC=cern,DC=ch"
        );
    }
}
