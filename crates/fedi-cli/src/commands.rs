use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fedi_client::{AuthorQuery, FollowState, HttpBackend, LikeTarget, PageRequest, SocialBackend};
use fedi_identity::{Author, AuthorRef, Comment, Entry, IdentityResolver, Route};
use fedi_relationships::{FollowAction, LikeState, Session};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CliError;
use crate::{Command, Kind};

/// Extra wait after the reconciliation delay so the re-check has landed
const RECHECK_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize)]
struct AuthorRow {
    id: String,
    #[serde(rename = "displayName")]
    display_name: String,
    remote: bool,
    route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct RequestRow {
    id: String,
    actor: String,
    #[serde(rename = "displayName")]
    display_name: String,
    status: FollowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested: Option<String>,
}

pub async fn run(command: Command, config: &Config) -> Result<(), CliError> {
    let resolver = IdentityResolver::parse(&config.api_base)
        .map_err(|e| CliError::Config(format!("invalid API base {}: {}", config.api_base, e)))?;

    let backend = Arc::new(HttpBackend::with_timeout(
        &config.api_base,
        config.http_timeout,
    )?);

    match command {
        Command::Route { id, kind, host } => {
            print_json(&describe_route(&resolver, &id, kind, host.as_deref()))
        }
        Command::Authors {
            search,
            approved,
            active,
            page,
            size,
            with_status,
        } => {
            let query = AuthorQuery {
                search,
                is_approved: approved,
                is_active: active,
                page: PageRequest { page, size },
            };
            let authors = backend.search_authors(&query).await?;
            let session = if with_status {
                Some(open_session(config, &backend, &resolver).await?)
            } else {
                None
            };

            let rows = futures::future::join_all(authors.items.iter().map(|author| {
                let session = session.as_ref();
                let resolver = &resolver;
                async move {
                    let action = match session {
                        Some(session) => session
                            .follows()
                            .status(author)
                            .await
                            .ok()
                            .map(|s| FollowAction::for_state(s.follow_status).label()),
                        None => None,
                    };
                    AuthorRow {
                        id: author.id.clone(),
                        display_name: author.display_name.clone(),
                        remote: resolver.is_remote(author),
                        route: resolver.route_for(author).to_string(),
                        action,
                    }
                }
            }))
            .await;
            print_json(&rows)
        }
        Command::Status { target } => {
            let session = open_session(config, &backend, &resolver).await?;
            let target = lookup_author(backend.as_ref(), &target).await;
            let status = session.follows().check_status(&target).await?;
            print_json(&json!({
                "target": resolver.full_url(&target),
                "is_following": status.is_following,
                "follow_status": status.follow_status,
                "action": FollowAction::for_state(status.follow_status).label(),
                "followers": session.follows().follower_count(&target),
            }))
        }
        Command::Follow { target } => {
            let session = open_session(config, &backend, &resolver).await?;
            let target = lookup_author(backend.as_ref(), &target).await;
            let follows = session.follows();
            follows.check_status(&target).await?;
            follows.request_follow(&target).await?;

            tokio::time::sleep(follows.settings().reconcile_delay + RECHECK_GRACE).await;
            let state = follows
                .relationship(&target)
                .map(|r| r.state)
                .unwrap_or_default();
            print_json(&json!({
                "target": resolver.full_url(&target),
                "follow_status": state,
                "action": FollowAction::for_state(state).label(),
            }))
        }
        Command::Unfollow { target } => {
            let session = open_session(config, &backend, &resolver).await?;
            let target = lookup_author(backend.as_ref(), &target).await;
            let follows = session.follows();
            follows.check_status(&target).await?;
            follows.unfollow(&target).await?;
            print_json(&json!({
                "target": resolver.full_url(&target),
                "follow_status": FollowState::None,
            }))
        }
        Command::Requests { all } => {
            let session = open_session(config, &backend, &resolver).await?;
            let requests = session.follows().load_requests(all).await?;
            let now = Utc::now();
            let rows: Vec<RequestRow> = requests
                .into_iter()
                .map(|r| RequestRow {
                    requested: r
                        .created_at
                        .as_deref()
                        .and_then(|at| describe_age(at, now)),
                    id: r.id,
                    actor: resolver.full_url(&r.actor),
                    display_name: r.actor.display_name,
                    status: r.status,
                })
                .collect();
            print_json(&rows)
        }
        Command::Accept { request_id } => {
            let session = open_session(config, &backend, &resolver).await?;
            let follows = session.follows();
            follows.load_requests(true).await?;
            follows.accept_request(&request_id).await?;
            print_json(&json!({ "id": request_id, "status": follows.request_state(&request_id) }))
        }
        Command::Reject { request_id } => {
            let session = open_session(config, &backend, &resolver).await?;
            let follows = session.follows();
            follows.load_requests(true).await?;
            follows.reject_request(&request_id).await?;
            print_json(&json!({ "id": request_id, "status": follows.request_state(&request_id) }))
        }
        Command::Like {
            id,
            comment,
            author,
        } => {
            let session = open_session(config, &backend, &resolver).await?;
            let likes = session.likes();
            let target = like_target(&resolver, &id, comment);
            if !comment {
                likes.load(&id).await?;
            }
            let state = likes.like(target, author.as_deref().unwrap_or_default()).await?;
            print_like(&id, state)
        }
        Command::Unlike { id, comment } => {
            let session = open_session(config, &backend, &resolver).await?;
            let likes = session.likes();
            let target = like_target(&resolver, &id, comment);
            if comment {
                // Comment likes are not listed, so assume the viewer's like exists
                likes.seed(
                    target.clone(),
                    LikeState {
                        liked: true,
                        count: 0,
                    },
                );
            } else {
                likes.load(&id).await?;
            }
            let state = likes.unlike(target).await?;
            print_like(&id, state)
        }
    }
}

async fn open_session(
    config: &Config,
    backend: &Arc<HttpBackend>,
    resolver: &IdentityResolver,
) -> Result<Session<HttpBackend>, CliError> {
    let viewer_id = config
        .viewer_id
        .as_deref()
        .ok_or_else(|| CliError::Config("FEDI_VIEWER_ID is not set".to_string()))?;
    let viewer = lookup_author(backend.as_ref(), viewer_id).await;

    Ok(Session::new(
        backend.clone(),
        resolver.clone(),
        viewer,
        config.follow_settings(),
    ))
}

/// Fetch an author, falling back to a bare reference when the node can't serve it
async fn lookup_author<B: SocialBackend + ?Sized>(backend: &B, id: &str) -> Author {
    match fedi_client::resolve_author(backend, AuthorRef::Unresolved(id.to_string())).await {
        Ok(author) => author,
        Err(err) => {
            warn!(author = id, error = %err, "Author lookup failed, using bare id");
            Author {
                id: id.to_string(),
                ..Default::default()
            }
        }
    }
}

fn like_target(resolver: &IdentityResolver, id: &str, comment: bool) -> LikeTarget {
    let id = resolver.canonical_id(id).to_string();
    if comment {
        LikeTarget::Comment(id)
    } else {
        LikeTarget::Entry(id)
    }
}

fn describe_route(
    resolver: &IdentityResolver,
    id: &str,
    kind: Kind,
    host: Option<&str>,
) -> serde_json::Value {
    if id.starts_with('/') {
        return match Route::parse(id) {
            Some(Route::Local { kind, id }) => {
                json!({ "kind": kind.prefix(), "remote": false, "id": id })
            }
            Some(Route::Remote { kind, url }) => {
                json!({ "kind": kind.prefix(), "remote": true, "url": url })
            }
            None => json!({ "route": id, "valid": false }),
        };
    }

    let (route, remote) = match kind {
        Kind::Author => {
            let author = Author {
                id: id.to_string(),
                host: host.unwrap_or_default().to_string(),
                ..Default::default()
            };
            (resolver.route_for(&author), resolver.is_remote(&author))
        }
        Kind::Entry => {
            let entry = Entry {
                id: id.to_string(),
                title: String::new(),
                description: String::new(),
                content: String::new(),
                content_type: String::new(),
                visibility: String::new(),
                author: AuthorRef::Unresolved(String::new()),
                published: None,
            };
            (resolver.route_for(&entry), resolver.is_remote(&entry))
        }
        Kind::Comment => {
            let comment = Comment {
                id: id.to_string(),
                comment: String::new(),
                content_type: String::new(),
                author: AuthorRef::Unresolved(String::new()),
                entry: None,
                published: None,
            };
            (resolver.route_for(&comment), resolver.is_remote(&comment))
        }
    };
    debug!(id, route = %route, "Resolved route");

    json!({
        "canonical_id": resolver.canonical_id(id),
        "remote": remote,
        "route": route.to_string(),
    })
}

/// Human-readable age of an RFC 3339 timestamp
fn describe_age(timestamp: &str, now: DateTime<Utc>) -> Option<String> {
    let at = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
    let age = now.signed_duration_since(at);

    Some(if age.num_minutes() < 1 {
        "just now".to_string()
    } else if age.num_hours() < 1 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_days() < 1 {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    })
}

fn print_like(id: &str, state: LikeState) -> Result<(), CliError> {
    print_json(&json!({ "id": id, "liked": state.liked, "count": state.count }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
