//! `Db` on top of the hosted backend's REST interface
//!
//! Rows are read and written through the PostgREST endpoints under
//! `/rest/v1`, and sessions come from the auth endpoints under `/auth/v1`.
//! Row-level security on the backend decides what each session may do.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Method};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::{
    api::{
        self, AuthToken, Category, Comment, CommentId, NewComment, NewPost, NewSession, Page,
        Post, PostId, PostUpdate, Profile, ProfileSummary, ProfileUpdate, Registration,
        SearchResults, Session, Tag, TagId, TagName, Target, UserId, Vote, VoteDirection,
        SEARCH_LIMIT,
    },
    Db, Error,
};

const MAX_RETRIES: u32 = 3;

const POST_COLUMNS: &str = "id,author_id,category_id,title,content,score,comments_count,\
                            is_deleted,created_at,updated_at,\
                            profiles(username,avatar_url),categories(name,slug)";
const COMMENT_COLUMNS: &str =
    "id,post_id,parent_id,author_id,content,score,created_at,is_deleted,\
     profiles(username,avatar_url)";
const VOTE_COLUMNS: &str = "user_id,post_id,comment_id,vote_type";
const PROFILE_SUMMARY_COLUMNS: &str = "id,username,avatar_url,reputation";

/// Ask PostgREST for exactly one row, answering 406 with code PGRST116 otherwise
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Clone)]
pub struct RestDb {
    client: ClientWithMiddleware,
    url: String,
    api_key: String,
}

#[derive(serde::Deserialize)]
struct AuthUser {
    id: UserId,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

/// Depending on whether email confirmation is enabled, signing up answers
/// with a full session or only with the new user
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[derive(serde::Deserialize)]
struct PostTagRow {
    tags: Option<Tag>,
}

#[derive(serde::Deserialize)]
struct TaggedPostRow {
    posts: Option<Post>,
}

#[derive(serde::Deserialize)]
struct TagWithPosts {
    post_tags: Vec<TaggedPostRow>,
}

impl RestDb {
    /// `url` is the project URL, `api_key` its public (anon) key
    pub fn new(url: &str, api_key: String) -> RestDb {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        RestDb {
            client,
            url: String::from(url.trim_end_matches('/')),
            api_key,
        }
    }

    fn request(&self, method: Method, path: &str, s: Option<&Session>) -> RequestBuilder {
        let token = s.map(|s| &s.token.0 as &str).unwrap_or(&self.api_key);
        self.client
            .request(method, format!("{}{}", self.url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    fn table(&self, method: Method, table: &str, s: Option<&Session>) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"), s)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<reqwest::Response, Error> {
        tracing::debug!(what, "sending request to backend");
        let resp = req
            .send()
            .await
            .with_context(|| format!("sending {what} request"))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading {what} error answer"))?;
        let err = api::Error::from_backend(status, &body);
        match &err {
            api::Error::Unknown(msg) => tracing::error!(%status, what, %msg, "backend error"),
            err => tracing::info!(%status, what, %err, "backend refused request"),
        }
        Err(Error::Api(err))
    }

    async fn parse<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T, Error> {
        let resp = self.send(req, what).await?;
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading {what} answer"))?;
        Ok(serde_json::from_slice(&body).with_context(|| format!("parsing {what} answer"))?)
    }

    async fn row<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T, Error> {
        self.parse(req.header(header::ACCEPT, SINGLE_OBJECT), what)
            .await
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>, Error> {
        self.parse(req, what).await
    }

    async fn count(&self, table: &str, filter: &[(&str, &str)]) -> Result<u64, Error> {
        let req = self
            .table(Method::HEAD, table, None)
            .query(&[("select", "id")])
            .query(filter)
            .header("Prefer", "count=exact");
        let resp = self.send(req, table).await?;
        let range = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|h| h.to_str().ok())
            .with_context(|| format!("counting {table} got no content-range"))?;
        Ok(parse_content_range(range)
            .with_context(|| format!("counting {table} got invalid content-range {range:?}"))?)
    }
}

/// JSON body, serialized up front as the middleware builder has no `json`
fn with_json<T: serde::Serialize>(req: RequestBuilder, body: &T) -> Result<RequestBuilder, Error> {
    let body = serde_json::to_vec(body).context("serializing request body")?;
    Ok(req
        .header(header::CONTENT_TYPE, "application/json")
        .body(body))
}

/// Total from a `Content-Range` header, like `0-19/57` or `*/0`
fn parse_content_range(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Value usable inside a PostgREST logic tree like `or=(...)`, where commas
/// and parentheses would otherwise be taken as syntax
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `or` filter matching the rows of the votes table for any of `targets`
fn votes_filter(targets: &[Target]) -> String {
    let list = |col: &str| {
        let ids = targets
            .iter()
            .filter(|t| t.column() == col)
            .map(|t| t.uuid().to_string())
            .collect::<Vec<_>>();
        (!ids.is_empty()).then(|| format!("{col}.in.({})", ids.join(",")))
    };
    let parts = ["post_id", "comment_id"]
        .into_iter()
        .filter_map(list)
        .collect::<Vec<_>>();
    format!("({})", parts.join(","))
}

#[async_trait]
impl Db for RestDb {
    async fn create_account(&self, r: &Registration) -> Result<UserId, Error> {
        let body = serde_json::json!({
            "email": r.email,
            "password": r.password,
            "data": {
                "username": r.username,
                "first_name": r.first_name,
                "last_name": r.last_name,
            },
        });
        let req = with_json(self.request(Method::POST, "/auth/v1/signup", None), &body)?;
        Ok(match self.parse(req, "sign-up").await? {
            SignUpResponse::Session(t) => t.user.id,
            SignUpResponse::User(u) => u.id,
        })
    }

    async fn sign_in(&self, s: &NewSession) -> Result<Session, Error> {
        s.validate()?;
        let req = self
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "password")]);
        let t: TokenResponse = self.parse(with_json(req, s)?, "sign-in").await?;
        tracing::info!(user = ?t.user.id, "signed in");
        Ok(Session {
            user: t.user.id,
            token: AuthToken(t.access_token),
        })
    }

    async fn sign_out(&self, s: &Session) -> Result<(), Error> {
        self.send(
            self.request(Method::POST, "/auth/v1/logout", Some(s)),
            "sign-out",
        )
        .await?;
        Ok(())
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, Error> {
        let req = self.table(Method::GET, "posts", None).query(&[
            ("select", POST_COLUMNS),
            ("is_deleted", "eq.false"),
            ("order", "created_at.desc"),
        ]);
        self.rows(req, "posts").await
    }

    async fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        let req = self.table(Method::GET, "posts", None).query(&[
            ("select", POST_COLUMNS),
            ("id", &*format!("eq.{}", post.0)),
            ("is_deleted", "eq.false"),
        ]);
        self.row(req, "post").await
    }

    async fn fetch_posts_by_category(&self, slug: &str) -> Result<Vec<Post>, Error> {
        let columns = POST_COLUMNS.replace("categories(", "categories!inner(");
        let req = self.table(Method::GET, "posts", None).query(&[
            ("select", &columns as &str),
            ("categories.slug", &*format!("eq.{slug}")),
            ("is_deleted", "eq.false"),
            ("order", "created_at.desc"),
        ]);
        self.rows(req, "category posts").await
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>, Error> {
        let req = self
            .table(Method::GET, "categories", None)
            .query(&[("select", "id,name,slug"), ("order", "name.asc")]);
        self.rows(req, "categories").await
    }

    async fn create_post(&self, s: &Session, p: &NewPost) -> Result<Post, Error> {
        p.validate()?;
        if p.author_id != s.user {
            return Err(Error::permission_denied());
        }
        let req = self
            .table(Method::POST, "posts", Some(s))
            .query(&[("select", POST_COLUMNS)])
            .header("Prefer", "return=representation");
        self.row(with_json(req, p)?, "new post").await
    }

    async fn update_post(&self, s: &Session, post: PostId, u: &PostUpdate) -> Result<Post, Error> {
        u.validate()?;
        let mut body = serde_json::to_value(u).context("serializing post update")?;
        body["updated_at"] = serde_json::json!(api::now());
        let req = self
            .table(Method::PATCH, "posts", Some(s))
            .query(&[
                ("select", POST_COLUMNS),
                ("id", &*format!("eq.{}", post.0)),
                ("is_deleted", "eq.false"),
            ])
            .header("Prefer", "return=representation");
        self.row(with_json(req, &body)?, "post update").await
    }

    async fn delete_post(&self, s: &Session, post: PostId) -> Result<(), Error> {
        let req = self
            .table(Method::PATCH, "posts", Some(s))
            .query(&[("select", "id"), ("id", &*format!("eq.{}", post.0))])
            .header("Prefer", "return=representation");
        let _: serde_json::Value = self
            .row(with_json(req, &serde_json::json!({ "is_deleted": true }))?, "post deletion")
            .await?;
        Ok(())
    }

    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        let req = self.table(Method::GET, "comments", None).query(&[
            ("select", COMMENT_COLUMNS),
            ("post_id", &*format!("eq.{}", post.0)),
            ("is_deleted", "eq.false"),
            ("order", "created_at.asc"),
        ]);
        self.rows(req, "comments").await
    }

    async fn create_comment(&self, s: &Session, c: &NewComment) -> Result<Comment, Error> {
        c.validate()?;
        if c.author_id != s.user {
            return Err(Error::permission_denied());
        }
        let req = self
            .table(Method::POST, "comments", Some(s))
            .query(&[("select", COMMENT_COLUMNS)])
            .header("Prefer", "return=representation");
        self.row(with_json(req, c)?, "new comment").await
    }

    async fn update_comment(
        &self,
        s: &Session,
        comment: CommentId,
        content: &str,
    ) -> Result<Comment, Error> {
        Comment::validate_edit(content)?;
        let req = self
            .table(Method::PATCH, "comments", Some(s))
            .query(&[
                ("select", COMMENT_COLUMNS),
                ("id", &*format!("eq.{}", comment.0)),
                ("is_deleted", "eq.false"),
            ])
            .header("Prefer", "return=representation");
        let body = serde_json::json!({ "content": content });
        self.row(with_json(req, &body)?, "comment update").await
    }

    async fn delete_comment(&self, s: &Session, comment: CommentId) -> Result<(), Error> {
        let req = self
            .table(Method::PATCH, "comments", Some(s))
            .query(&[("select", "id"), ("id", &*format!("eq.{}", comment.0))])
            .header("Prefer", "return=representation");
        let body = serde_json::json!({ "is_deleted": true });
        let _: serde_json::Value = self
            .row(with_json(req, &body)?, "comment deletion")
            .await?;
        Ok(())
    }

    async fn fetch_votes(&self, s: &Session, targets: &[Target]) -> Result<Vec<Vote>, Error> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let req = self.table(Method::GET, "votes", Some(s)).query(&[
            ("select", VOTE_COLUMNS),
            ("user_id", &*format!("eq.{}", s.user.0)),
            ("or", &*votes_filter(targets)),
        ]);
        self.rows(req, "votes").await
    }

    async fn upsert_vote(
        &self,
        s: &Session,
        target: Target,
        dir: VoteDirection,
    ) -> Result<Vote, Error> {
        let req = self
            .table(Method::POST, "votes", Some(s))
            .query(&[
                ("select", VOTE_COLUMNS),
                ("on_conflict", &*format!("user_id,{}", target.column())),
            ])
            .header("Prefer", "resolution=merge-duplicates,return=representation");
        let vote = Vote::new(s.user, target, dir);
        self.row(with_json(req, &vote)?, "vote").await
    }

    async fn remove_vote(&self, s: &Session, target: Target) -> Result<(), Error> {
        let req = self.table(Method::DELETE, "votes", Some(s)).query(&[
            ("user_id", format!("eq.{}", s.user.0)),
            (target.column(), format!("eq.{}", target.uuid())),
        ]);
        self.send(req, "vote removal").await?;
        Ok(())
    }

    async fn fetch_tags(&self) -> Result<Vec<Tag>, Error> {
        let req = self
            .table(Method::GET, "tags", None)
            .query(&[("select", "id,name"), ("order", "name.asc")]);
        self.rows(req, "tags").await
    }

    async fn fetch_tags_for_post(&self, post: PostId) -> Result<Vec<Tag>, Error> {
        let req = self.table(Method::GET, "post_tags", None).query(&[
            ("select", "tags(id,name)"),
            ("post_id", &*format!("eq.{}", post.0)),
        ]);
        let rows: Vec<PostTagRow> = self.rows(req, "post tags").await?;
        Ok(rows.into_iter().filter_map(|r| r.tags).collect())
    }

    async fn add_tag_to_post(&self, s: &Session, post: PostId, name: &str) -> Result<Tag, Error> {
        let name = Tag::normalize_name(name)?;
        let existing: Vec<Tag> = self
            .rows(
                self.table(Method::GET, "tags", Some(s))
                    .query(&[("select", "id,name"), ("name", &*format!("eq.{name}"))]),
                "tag lookup",
            )
            .await?;
        let tag = match existing.into_iter().next() {
            Some(tag) => tag,
            None => {
                let req = self
                    .table(Method::POST, "tags", Some(s))
                    .query(&[("select", "id,name")])
                    .header("Prefer", "return=representation");
                let body = serde_json::json!({ "name": name });
                self.row(with_json(req, &body)?, "new tag").await?
            }
        };
        let req = self
            .table(Method::POST, "post_tags", Some(s))
            .query(&[("on_conflict", "post_id,tag_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal");
        let body = serde_json::json!({ "post_id": post, "tag_id": tag.id });
        self.send(with_json(req, &body)?, "post tag").await?;
        Ok(tag)
    }

    async fn remove_tag_from_post(
        &self,
        s: &Session,
        post: PostId,
        tag: TagId,
    ) -> Result<(), Error> {
        let req = self.table(Method::DELETE, "post_tags", Some(s)).query(&[
            ("post_id", format!("eq.{}", post.0)),
            ("tag_id", format!("eq.{}", tag.0)),
        ]);
        self.send(req, "post tag removal").await?;
        Ok(())
    }

    async fn fetch_posts_by_tag(&self, name: &str) -> Result<Vec<Post>, Error> {
        let name = Tag::normalize_name(name)?;
        let req = self.table(Method::GET, "tags", None).query(&[
            ("select", &*format!("id,name,post_tags(posts({POST_COLUMNS}))") as &str),
            ("name", &*format!("eq.{name}")),
        ]);
        let tags: Vec<TagWithPosts> = self.rows(req, "tagged posts").await?;
        let mut posts = tags
            .into_iter()
            .flat_map(|t| t.post_tags)
            .filter_map(|pt| pt.posts)
            .filter(|p| !p.is_deleted)
            .collect::<Vec<_>>();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Profile, Error> {
        let req = self
            .table(Method::GET, "profiles", None)
            .query(&[("select", "*"), ("id", &*format!("eq.{}", user.0))]);
        self.row(req, "profile").await
    }

    async fn fetch_profile_by_username(&self, username: &str) -> Result<Profile, Error> {
        let req = self
            .table(Method::GET, "profiles", None)
            .query(&[("select", "*"), ("username", &*format!("eq.{username}"))]);
        self.row(req, "profile").await
    }

    async fn update_profile(&self, s: &Session, u: &ProfileUpdate) -> Result<Profile, Error> {
        u.validate()?;
        let req = self
            .table(Method::PATCH, "profiles", Some(s))
            .query(&[("select", "*"), ("id", &*format!("eq.{}", s.user.0))])
            .header("Prefer", "return=representation");
        self.row(with_json(req, u)?, "profile update").await
    }

    async fn top_profiles(&self, limit: usize) -> Result<Vec<ProfileSummary>, Error> {
        let req = self.table(Method::GET, "profiles", None).query(&[
            ("select", PROFILE_SUMMARY_COLUMNS),
            ("order", "reputation.desc"),
            ("limit", &*limit.to_string()),
        ]);
        self.rows(req, "top profiles").await
    }

    async fn search_matching(&self, query: &str) -> Result<SearchResults, Error> {
        let pattern = format!("*{query}*");
        let limit = SEARCH_LIMIT.to_string();
        let posts_filter = format!(
            "(title.ilike.{},content.ilike.{})",
            quote(&pattern),
            quote(&pattern)
        );
        let ilike = format!("ilike.{pattern}");
        let posts = self.rows::<Post>(
            self.table(Method::GET, "posts", None).query(&[
                ("select", POST_COLUMNS),
                ("or", &*posts_filter),
                ("is_deleted", "eq.false"),
                ("limit", &*limit),
            ]),
            "post search",
        );
        let users = self.rows::<ProfileSummary>(
            self.table(Method::GET, "profiles", None).query(&[
                ("select", PROFILE_SUMMARY_COLUMNS),
                ("username", &*ilike),
                ("limit", &*limit),
            ]),
            "user search",
        );
        let tags = self.rows::<TagName>(
            self.table(Method::GET, "tags", None).query(&[
                ("select", "name"),
                ("name", &*ilike),
                ("limit", &*limit),
            ]),
            "tag search",
        );
        let (posts, users, tags) = futures::try_join!(posts, users, tags)?;
        Ok(SearchResults { posts, users, tags })
    }

    async fn list_profiles(
        &self,
        s: &Session,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Profile>, Error> {
        let req = self
            .table(Method::GET, "profiles", Some(s))
            .query(&[
                ("select", "*"),
                ("order", "created_at.asc"),
                ("offset", &*(page * per_page).to_string()),
                ("limit", &*per_page.to_string()),
            ])
            .header("Prefer", "count=exact");
        let resp = self.send(req, "profile list").await?;
        let total = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_content_range)
            .context("profile list answer has no usable content-range")?;
        let body = resp.bytes().await.context("reading profile list")?;
        let items = serde_json::from_slice(&body).context("parsing profile list")?;
        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    async fn set_admin(&self, s: &Session, user: UserId, is_admin: bool) -> Result<Profile, Error> {
        let req = self
            .table(Method::PATCH, "profiles", Some(s))
            .query(&[("select", "*"), ("id", &*format!("eq.{}", user.0))])
            .header("Prefer", "return=representation");
        let body = serde_json::json!({ "is_admin": is_admin });
        self.row(with_json(req, &body)?, "admin change").await
    }

    async fn set_blocked(
        &self,
        s: &Session,
        user: UserId,
        is_blocked: bool,
    ) -> Result<Profile, Error> {
        let req = self
            .table(Method::PATCH, "profiles", Some(s))
            .query(&[("select", "*"), ("id", &*format!("eq.{}", user.0))])
            .header("Prefer", "return=representation");
        let body = serde_json::json!({ "is_blocked": is_blocked });
        self.row(with_json(req, &body)?, "block change").await
    }

    async fn count_users(&self) -> Result<u64, Error> {
        self.count("profiles", &[]).await
    }

    async fn count_posts(&self) -> Result<u64, Error> {
        self.count("posts", &[("is_deleted", "eq.false")]).await
    }

    async fn count_comments(&self) -> Result<u64, Error> {
        self.count("comments", &[("is_deleted", "eq.false")]).await
    }
}
