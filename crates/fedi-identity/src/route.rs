//! Client-side routes for entities.
//!
//! Local entities live at `/<prefix>/<uuid>`, remote ones at
//! `/<prefix>/remote/<percent-encoded url>`. A remote route always has one more
//! segment than a local one, so the two can never collide.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Author,
    Entry,
    Comment,
}

impl EntityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Author => "authors",
            EntityKind::Entry => "posts",
            EntityKind::Comment => "comments",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "authors" => Some(EntityKind::Author),
            "posts" => Some(EntityKind::Entry),
            "comments" => Some(EntityKind::Comment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Local { kind: EntityKind, id: String },
    Remote { kind: EntityKind, url: String },
}

const REMOTE_SEGMENT: &str = "remote";

impl Route {
    pub fn kind(&self) -> EntityKind {
        match self {
            Route::Local { kind, .. } | Route::Remote { kind, .. } => *kind,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Route::Remote { .. })
    }

    /// Parse a path produced by `Display` back into a route
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.trim_matches('/').split('/');
        let kind = EntityKind::from_prefix(segments.next()?)?;
        let first = segments.next()?;
        let second = segments.next();
        if segments.next().is_some() {
            return None;
        }

        match (first, second) {
            (REMOTE_SEGMENT, Some(encoded)) => Some(Route::Remote {
                kind,
                url: urlencoding::decode(encoded).ok()?.into_owned(),
            }),
            (id, None) if !id.is_empty() => Some(Route::Local {
                kind,
                id: urlencoding::decode(id).ok()?.into_owned(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Local { kind, id } => {
                write!(f, "/{}/{}", kind.prefix(), urlencoding::encode(id))
            }
            Route::Remote { kind, url } => write!(
                f,
                "/{}/{}/{}",
                kind.prefix(),
                REMOTE_SEGMENT,
                urlencoding::encode(url)
            ),
        }
    }
}
