use async_trait::async_trait;

use crate::{
    api::{
        Category, Comment, CommentId, NewComment, NewPost, NewSession, Page, Post, PostId,
        PostUpdate, Profile, ProfileSummary, ProfileUpdate, Registration, SearchResults, Session,
        Stats, Tag, TagId, Target, UserId, Vote, VoteDirection,
    },
    Error,
};

/// Everything the forum needs from its backend
///
/// Reads of public data take no session. Anything done on behalf of a user
/// takes that user's `Session`, which the implementation uses both as
/// identity and as credentials. Implementations validate their inputs with
/// the `validate` functions of the api crate before acting on them.
#[async_trait]
pub trait Db: Send + Sync {
    async fn create_account(&self, r: &Registration) -> Result<UserId, Error>;
    async fn sign_in(&self, s: &NewSession) -> Result<Session, Error>;
    async fn sign_out(&self, s: &Session) -> Result<(), Error>;

    async fn fetch_posts(&self) -> Result<Vec<Post>, Error>;
    async fn fetch_post(&self, post: PostId) -> Result<Post, Error>;
    async fn fetch_posts_by_category(&self, slug: &str) -> Result<Vec<Post>, Error>;
    async fn fetch_categories(&self) -> Result<Vec<Category>, Error>;
    async fn create_post(&self, s: &Session, p: &NewPost) -> Result<Post, Error>;
    async fn update_post(&self, s: &Session, post: PostId, u: &PostUpdate) -> Result<Post, Error>;
    async fn delete_post(&self, s: &Session, post: PostId) -> Result<(), Error>;

    /// Comments of a post, oldest first, deleted ones excluded
    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error>;
    async fn create_comment(&self, s: &Session, c: &NewComment) -> Result<Comment, Error>;
    async fn update_comment(
        &self,
        s: &Session,
        comment: CommentId,
        content: &str,
    ) -> Result<Comment, Error>;
    async fn delete_comment(&self, s: &Session, comment: CommentId) -> Result<(), Error>;

    /// The session user's votes on any of `targets`
    async fn fetch_votes(&self, s: &Session, targets: &[Target]) -> Result<Vec<Vote>, Error>;
    /// Inserts the vote, or replaces the session user's previous vote on the
    /// same target
    async fn upsert_vote(
        &self,
        s: &Session,
        target: Target,
        dir: VoteDirection,
    ) -> Result<Vote, Error>;
    /// Removing a vote that does not exist is not an error
    async fn remove_vote(&self, s: &Session, target: Target) -> Result<(), Error>;

    async fn fetch_tags(&self) -> Result<Vec<Tag>, Error>;
    async fn fetch_tags_for_post(&self, post: PostId) -> Result<Vec<Tag>, Error>;
    /// Creates the tag if no tag with the same normalized name exists yet
    async fn add_tag_to_post(&self, s: &Session, post: PostId, name: &str) -> Result<Tag, Error>;
    async fn remove_tag_from_post(&self, s: &Session, post: PostId, tag: TagId)
        -> Result<(), Error>;
    /// Posts carrying the tag, empty if the tag does not exist
    async fn fetch_posts_by_tag(&self, name: &str) -> Result<Vec<Post>, Error>;

    async fn fetch_profile(&self, user: UserId) -> Result<Profile, Error>;
    async fn fetch_profile_by_username(&self, username: &str) -> Result<Profile, Error>;
    async fn update_profile(&self, s: &Session, u: &ProfileUpdate) -> Result<Profile, Error>;
    /// Highest reputation first
    async fn top_profiles(&self, limit: usize) -> Result<Vec<ProfileSummary>, Error>;

    /// Case-insensitive substring search on an already-normalized query
    async fn search_matching(&self, query: &str) -> Result<SearchResults, Error>;

    /// Profiles by creation date, `page` counting from 0
    async fn list_profiles(
        &self,
        s: &Session,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Profile>, Error>;
    async fn set_admin(&self, s: &Session, user: UserId, is_admin: bool)
        -> Result<Profile, Error>;
    async fn set_blocked(
        &self,
        s: &Session,
        user: UserId,
        is_blocked: bool,
    ) -> Result<Profile, Error>;

    async fn count_users(&self) -> Result<u64, Error>;
    async fn count_posts(&self) -> Result<u64, Error>;
    async fn count_comments(&self) -> Result<u64, Error>;

    /// Registers a new user, refusing a username that is already taken before
    /// even reaching the auth service
    async fn sign_up(&self, r: &Registration) -> Result<UserId, Error> {
        r.validate()?;
        match self.fetch_profile_by_username(&r.username).await {
            Ok(_) => return Err(Error::name_already_used(r.username.clone())),
            Err(e) if e.is_not_found() => (),
            Err(e) => return Err(e),
        }
        let user = self.create_account(r).await?;
        tracing::info!(?user, username = %r.username, "registered new user");
        Ok(user)
    }

    /// Queries too short to be meaningful match nothing, without any request
    async fn search(&self, query: &str) -> Result<SearchResults, Error> {
        match SearchResults::normalize_query(query) {
            Some(q) => self.search_matching(q).await,
            None => Ok(SearchResults::default()),
        }
    }

    async fn stats(&self) -> Result<Stats, Error> {
        let (users, posts, comments) = futures::try_join!(
            self.count_users(),
            self.count_posts(),
            self.count_comments()
        )?;
        Ok(Stats {
            users,
            posts,
            comments,
        })
    }
}
