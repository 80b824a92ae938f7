/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// HTTP verbs a resource can declare validation rules for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        }
    }
}

/// What part of a collection an endpoint operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// `GET /` and `POST /`
    Collection,
    /// `GET /count`
    Count,
    /// `GET|PATCH|DELETE /:id`
    Single,
}

/// Every endpoint shape the resource router serves.
/// Each one is a fixed {verb x scope} pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    List,
    Create,
    Count,
    Read,
    Update,
    Delete,
}

impl Endpoint {
    pub fn verb(&self) -> Verb {
        match self {
            Endpoint::List | Endpoint::Count | Endpoint::Read => Verb::Get,
            Endpoint::Create => Verb::Post,
            Endpoint::Update => Verb::Patch,
            Endpoint::Delete => Verb::Delete,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Endpoint::List | Endpoint::Create => Scope::Collection,
            Endpoint::Count => Scope::Count,
            Endpoint::Read | Endpoint::Update | Endpoint::Delete => Scope::Single,
        }
    }
}
