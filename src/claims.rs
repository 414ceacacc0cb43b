use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claim type names produced by [`map_tenant_claim_types`].
pub mod claim_types {
    pub const USER_ID: &str = "user_id";
    pub const USER_NAME: &str = "user_name";
    pub const NAME: &str = "name";
    pub const SURNAME: &str = "surname";
    pub const EMAIL: &str = "email";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const PHONE_NUMBER_VERIFIED: &str = "phone_number_verified";
    pub const ROLE: &str = "role";
    pub const TENANT_ID: &str = "tenant_id";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAction {
    /// Copy `json_key` from the user JSON into claims of `claim_type`.
    MapJsonKey { claim_type: String, json_key: String },
    /// Drop every claim of this type produced so far.
    DeleteClaim(String),
}

/// Ordered rules that turn ID-token (or userinfo) JSON into claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimActionCollection {
    actions: Vec<ClaimAction>,
}

impl ClaimActionCollection {
    pub fn map_json_key(&mut self, claim_type: impl Into<String>, json_key: impl Into<String>) {
        self.actions.push(ClaimAction::MapJsonKey {
            claim_type: claim_type.into(),
            json_key: json_key.into(),
        });
    }

    pub fn delete_claim(&mut self, claim_type: impl Into<String>) {
        self.actions.push(ClaimAction::DeleteClaim(claim_type.into()));
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClaimAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn apply(&self, user: &Value) -> Vec<Claim> {
        let mut claims: Vec<Claim> = Vec::new();

        for action in &self.actions {
            match action {
                ClaimAction::MapJsonKey { claim_type, json_key } => {
                    let Some(value) = user.get(json_key) else {
                        continue;
                    };
                    match value {
                        Value::Array(items) => {
                            for item in items {
                                if let Some(v) = claim_value(item) {
                                    push_unique(&mut claims, Claim::new(claim_type, v));
                                }
                            }
                        }
                        other => {
                            if let Some(v) = claim_value(other) {
                                push_unique(&mut claims, Claim::new(claim_type, v));
                            }
                        }
                    }
                }
                ClaimAction::DeleteClaim(claim_type) => {
                    claims.retain(|c| &c.claim_type != claim_type);
                }
            }
        }

        claims
    }
}

fn claim_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn push_unique(claims: &mut Vec<Claim>, claim: Claim) {
    if !claims.contains(&claim) {
        claims.push(claim);
    }
}

/// Map standard OpenID Connect claims onto this crate's claim types.
pub fn map_tenant_claim_types(actions: &mut ClaimActionCollection) {
    actions.map_json_key(claim_types::USER_ID, "sub");
    actions.map_json_key(claim_types::USER_NAME, "preferred_username");
    actions.map_json_key(claim_types::NAME, "given_name");
    actions.map_json_key(claim_types::SURNAME, "family_name");
    actions.map_json_key(claim_types::EMAIL, "email");
    actions.map_json_key(claim_types::EMAIL_VERIFIED, "email_verified");
    actions.map_json_key(claim_types::PHONE_NUMBER, "phone_number");
    actions.map_json_key(claim_types::PHONE_NUMBER_VERIFIED, "phone_number_verified");
    actions.map_json_key(claim_types::ROLE, "role");
    actions.map_json_key(claim_types::TENANT_ID, "tenantid");
}

/// First claim of the given type.
pub fn find_claim<'a>(claims: &'a [Claim], claim_type: &str) -> Option<&'a str> {
    claims
        .iter()
        .find(|c| c.claim_type == claim_type)
        .map(|c| c.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tenant_claim_mapping() {
        let mut actions = ClaimActionCollection::default();
        map_tenant_claim_types(&mut actions);

        let claims = actions.apply(&json!({
            "sub": "u-1",
            "preferred_username": "alice",
            "email": "alice@acme.test",
            "email_verified": true,
            "role": ["admin", "auditor"],
            "tenantid": "acme",
            "phone_number": null,
        }));

        assert_eq!(find_claim(&claims, claim_types::USER_ID), Some("u-1"));
        assert_eq!(find_claim(&claims, claim_types::USER_NAME), Some("alice"));
        assert_eq!(find_claim(&claims, claim_types::EMAIL_VERIFIED), Some("true"));
        assert_eq!(find_claim(&claims, claim_types::TENANT_ID), Some("acme"));
        assert_eq!(find_claim(&claims, claim_types::PHONE_NUMBER), None);

        let roles: Vec<_> = claims
            .iter()
            .filter(|c| c.claim_type == claim_types::ROLE)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(roles, vec!["admin", "auditor"]);
    }

    #[test]
    fn test_delete_claim_removes_earlier_mapping() {
        let mut actions = ClaimActionCollection::default();
        actions.map_json_key("nickname", "nickname");
        actions.map_json_key("email", "email");
        actions.delete_claim("nickname");

        let claims = actions.apply(&json!({ "nickname": "al", "email": "a@b.c" }));
        assert_eq!(claims, vec![Claim::new("email", "a@b.c")]);
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let mut actions = ClaimActionCollection::default();
        actions.map_json_key("role", "role");
        actions.map_json_key("role", "roles");

        let claims = actions.apply(&json!({ "role": "admin", "roles": ["admin", "user"] }));
        assert_eq!(claims.len(), 2);
    }
}
