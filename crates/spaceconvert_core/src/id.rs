//! Matrix identifier newtypes
//!
//! Every identifier the bot handles carries a sigil (`@`, `!`, `$`, `#`, `+`).
//! User ids, room aliases, and community ids also carry a server name after
//! the first `:`, which is what routing hints and alias derivation need.

use crate::error::CoreError;

/// Split `sigil localpart ':' server` into its parts, validating each.
fn split_qualified<'a>(
    value: &'a str,
    sigil: char,
    kind: &'static str,
) -> Result<(&'a str, &'a str), CoreError> {
    let invalid = |reason| CoreError::InvalidId {
        kind,
        sigil,
        value: value.to_string(),
        reason,
    };

    let rest = value
        .strip_prefix(sigil)
        .ok_or_else(|| invalid("missing sigil"))?;
    let (localpart, server) = rest
        .split_once(':')
        .ok_or_else(|| invalid("missing server name"))?;
    if localpart.is_empty() {
        return Err(invalid("empty localpart"));
    }
    if server.is_empty() {
        return Err(invalid("empty server name"));
    }
    Ok((localpart, server))
}

macro_rules! id_common {
    ($type_name:ident) => {
        impl $type_name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $type_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $type_name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ::std::str::FromStr for $type_name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $type_name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$type_name> for String {
            fn from(id: $type_name) -> String {
                id.0
            }
        }
    };
}

/// Identifier with a server name (`@user:server`, `#alias:server`, `+group:server`)
macro_rules! define_qualified_id {
    ($(#[$meta:meta])* $type_name:ident, $sigil:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $type_name(String);

        impl $type_name {
            pub const SIGIL: char = $sigil;

            pub fn parse(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                split_qualified(&value, $sigil, $kind)?;
                Ok(Self(value))
            }

            /// Everything between the sigil and the first `:`
            pub fn localpart(&self) -> &str {
                self.split().0
            }

            /// Everything after the first `:`
            pub fn server_name(&self) -> &str {
                self.split().1
            }

            fn split(&self) -> (&str, &str) {
                // validated on construction
                let rest = &self.0[$sigil.len_utf8()..];
                rest.split_once(':').unwrap_or((rest, ""))
            }
        }

        id_common!($type_name);
    };
}

/// Identifier treated as opaque beyond its sigil (`!room`, `$event`)
macro_rules! define_opaque_id {
    ($(#[$meta:meta])* $type_name:ident, $sigil:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $type_name(String);

        impl $type_name {
            pub const SIGIL: char = $sigil;

            pub fn parse(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                let problem = match value.strip_prefix($sigil) {
                    Some("") => Some("empty identifier"),
                    Some(_) => None,
                    None => Some("missing sigil"),
                };
                match problem {
                    None => Ok(Self(value)),
                    Some(reason) => Err(CoreError::InvalidId {
                        kind: $kind,
                        sigil: $sigil,
                        value,
                        reason,
                    }),
                }
            }
        }

        id_common!($type_name);
    };
}

define_qualified_id!(
    /// A Matrix user, e.g. `@spaceconvert:example.org`
    UserId,
    '@',
    "user id"
);

define_qualified_id!(
    /// A room alias, e.g. `#general:example.org`
    RoomAlias,
    '#',
    "room alias"
);

define_qualified_id!(
    /// A legacy community, e.g. `+example:example.org`
    GroupId,
    '+',
    "community id"
);

define_opaque_id!(
    /// A room id, e.g. `!abcdef:example.org`
    RoomId,
    '!',
    "room id"
);

define_opaque_id!(
    /// An event id. Room versions 3+ drop the server part, so only the sigil is checked.
    EventId,
    '$',
    "event id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parts() {
        let user = UserId::parse("@bot:example.org").unwrap();
        assert_eq!(user.localpart(), "bot");
        assert_eq!(user.server_name(), "example.org");
        assert_eq!(user.to_string(), "@bot:example.org");
    }

    #[test]
    fn test_server_name_keeps_port() {
        let alias = RoomAlias::parse("#room:matrix.example.org:8448").unwrap();
        assert_eq!(alias.localpart(), "room");
        assert_eq!(alias.server_name(), "matrix.example.org:8448");
    }

    #[test]
    fn test_group_id_parts() {
        let group: GroupId = "+example:example.org".parse().unwrap();
        assert_eq!(group.localpart(), "example");
        assert_eq!(group.server_name(), "example.org");
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(UserId::parse("bot:example.org").is_err());
        assert!(UserId::parse("@bot").is_err());
        assert!(UserId::parse("@:example.org").is_err());
        assert!(UserId::parse("@bot:").is_err());
        assert!(GroupId::parse("#example:example.org").is_err());
        assert!(RoomId::parse("!").is_err());
        assert!(EventId::parse("abc").is_err());
    }

    #[test]
    fn test_event_id_without_server() {
        let event = EventId::parse("$Rqnc-F-dvnEYJTyHq_iKxU2bZ1CI92-kuZq3a5lr5Zg").unwrap();
        assert_eq!(event.as_str(), "$Rqnc-F-dvnEYJTyHq_iKxU2bZ1CI92-kuZq3a5lr5Zg");
    }

    #[test]
    fn test_serde_validates() {
        let user: UserId = serde_json::from_str("\"@alice:example.org\"").unwrap();
        assert_eq!(user.server_name(), "example.org");
        assert!(serde_json::from_str::<UserId>("\"alice\"").is_err());
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"@alice:example.org\"");
    }
}
