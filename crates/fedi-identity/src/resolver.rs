use url::Url;

use crate::model::{Addressable, Author};
use crate::route::{EntityKind, Route};
use crate::url_utils::{absolute_url, is_uuid, trailing_segment};

/// Maps raw identifiers to their canonical form and client route, relative to the
/// node this client talks to.
///
/// Every method is total: identifiers that are neither UUIDs nor URLs are echoed back
/// and routed as if they were local.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    api_base: Url,
}

impl IdentityResolver {
    /// Create a resolver for the node whose API is rooted at `api_base`
    /// (e.g. `http://localhost:8000/api/`).
    pub fn new(mut api_base: Url) -> Self {
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Self { api_base }
    }

    pub fn parse(api_base: &str) -> Result<Self, url::ParseError> {
        Url::parse(api_base).map(Self::new)
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Bare UUID for local entities, the raw identifier for everything else.
    ///
    /// Idempotent: feeding the result back in returns it unchanged.
    pub fn canonical_id<'a>(&self, raw: &'a str) -> &'a str {
        if is_uuid(raw) {
            return raw;
        }
        if let Some(url) = absolute_url(raw) {
            if self.is_local_url(&url) {
                let segment = trailing_segment(raw);
                if is_uuid(segment) {
                    return segment;
                }
            }
        }
        raw
    }

    /// Whether two identifiers denote the same entity
    pub fn same_entity(&self, a: &str, b: &str) -> bool {
        self.canonical_id(a) == self.canonical_id(b)
    }

    /// True when the URL is served by the local node
    pub fn is_local_url(&self, url: &Url) -> bool {
        url.host_str() == self.api_base.host_str()
            && url.port_or_known_default() == self.api_base.port_or_known_default()
    }

    /// True when a host string (`http://node/api/` or bare `node[:port]`) names the local node
    pub fn is_local_host(&self, host: &str) -> bool {
        if let Some(url) = absolute_url(host) {
            return self.is_local_url(&url);
        }

        let host = host.trim_end_matches('/').to_ascii_lowercase();
        let local_host = self.api_base.host_str().unwrap_or_default();
        match self.api_base.port() {
            Some(port) => host == format!("{local_host}:{port}") || host == local_host,
            None => host == local_host,
        }
    }

    /// An entity that claims a host is remote exactly when that host is foreign,
    /// whatever its identifier looks like. Without a host, a URL identifier on another
    /// node is remote; bare or malformed identifiers count as local.
    pub fn is_remote<E: Addressable + ?Sized>(&self, entity: &E) -> bool {
        if let Some(host) = entity.host() {
            return !self.is_local_host(host);
        }
        match absolute_url(entity.raw_id()) {
            Some(url) => !self.is_local_url(&url),
            None => false,
        }
    }

    pub fn route_for<E: Addressable + ?Sized>(&self, entity: &E) -> Route {
        let raw = entity.raw_id();
        if self.is_remote(entity) {
            let url = entity
                .fqid()
                .map(str::to_string)
                .or_else(|| self.url_on_claimed_host(entity));
            if let Some(url) = url {
                return Route::Remote { kind: E::KIND, url };
            }
        }
        Route::Local {
            kind: E::KIND,
            id: self.canonical_id(raw).to_string(),
        }
    }

    /// Fully-qualified URL for an author identifier, as the backend's follow
    /// endpoints expect. A bare UUID is expanded against the local API base.
    pub fn full_url_for_id(&self, raw: &str) -> String {
        if absolute_url(raw).is_some() {
            return raw.to_string();
        }
        match self.api_base.join(&format!("authors/{}", urlencoding::encode(raw))) {
            Ok(url) => url.to_string(),
            Err(_) => raw.to_string(),
        }
    }

    /// Fully-qualified URL for an author: its `url`, else an absolute id, else its
    /// UUID expanded against the node it lives on
    pub fn full_url(&self, author: &Author) -> String {
        if let Some(url) = author.fqid() {
            return url.to_string();
        }
        if self.is_remote(author) {
            if let Some(url) = self.url_on_claimed_host(author) {
                return url;
            }
        }
        self.full_url_for_id(&author.id)
    }

    /// `<host>authors/<id>` for an author that only carries a bare id and a host
    fn url_on_claimed_host<E: Addressable + ?Sized>(&self, entity: &E) -> Option<String> {
        if E::KIND != EntityKind::Author {
            return None;
        }
        let host = entity.host()?;
        let mut base = match absolute_url(host) {
            Some(url) => url,
            None => Url::parse(&format!("https://{}/", host.trim_end_matches('/'))).ok()?,
        };
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&format!("authors/{}", urlencoding::encode(entity.raw_id())))
            .ok()
            .map(|url| url.to_string())
    }
}
