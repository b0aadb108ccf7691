use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bricklayer_client::{
    api::{
        self, AuthInfo, AuthToken, Category, Comment, CommentId, NewComment, NewPost, NewSession,
        Page, Post, PostId, PostUpdate, Profile, ProfileSummary, ProfileUpdate, Registration,
        SearchResults, Session, Tag, TagId, TagName, Target, UserId, Uuid, Vote, VoteDirection,
        SEARCH_LIMIT,
    },
    Db, Error,
};
use tokio::sync::Mutex;

/// In-memory backend, enforcing the same rules as the hosted one
pub struct MockServer(Mutex<State>);

/// Serializable snapshot of a whole `MockServer`
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct Fixture {
    pub users: Vec<FixtureUser>,
    pub categories: Vec<Category>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub votes: Vec<Vote>,
    pub tags: Vec<Tag>,
    pub post_tags: Vec<(PostId, TagId)>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct FixtureUser {
    pub email: String,
    pub password: String,
    pub profile: Profile,
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, DbUser>,
    categories: Vec<Category>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    votes: Vec<Vote>,
    tags: Vec<Tag>,
    post_tags: Vec<(PostId, TagId)>,
    failing_writes: usize,
}

#[derive(Debug)]
struct DbUser {
    email: String,
    pass: String,
    profile: Profile,
    sessions: HashSet<AuthToken>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(State::default()))
    }

    pub fn from_fixture(f: Fixture) -> MockServer {
        let users = f
            .users
            .into_iter()
            .map(|u| {
                (
                    u.profile.id,
                    DbUser {
                        email: u.email,
                        pass: u.password,
                        profile: u.profile,
                        sessions: HashSet::new(),
                    },
                )
            })
            .collect();
        MockServer(Mutex::new(State {
            users,
            categories: f.categories,
            posts: f.posts,
            comments: f.comments,
            votes: f.votes,
            tags: f.tags,
            post_tags: f.post_tags,
            failing_writes: 0,
        }))
    }

    pub async fn fixture(&self) -> Fixture {
        let st = self.0.lock().await;
        Fixture {
            users: st
                .users
                .values()
                .map(|u| FixtureUser {
                    email: u.email.clone(),
                    password: u.pass.clone(),
                    profile: u.profile.clone(),
                })
                .collect(),
            categories: st.categories.clone(),
            posts: st.posts.clone(),
            comments: st.comments.clone(),
            votes: st.votes.clone(),
            tags: st.tags.clone(),
            post_tags: st.post_tags.clone(),
        }
    }

    /// Return email & pass for user number `id`
    pub fn test_get_user_info(&mut self, id: usize) -> (String, String) {
        let st = self.0.get_mut();
        let u = st
            .users
            .values()
            .nth(id)
            .unwrap_or_else(|| panic!("getting user {id} among {}", st.users.len()));
        (u.email.clone(), u.pass.clone())
    }

    pub fn test_num_users(&mut self) -> usize {
        self.0.get_mut().users.len()
    }

    pub fn admin_create_category(&mut self, name: &str, slug: &str) -> Category {
        let c = Category {
            id: api::CategoryId(Uuid::new_v4()),
            name: String::from(name),
            slug: String::from(slug),
        };
        self.0.get_mut().categories.push(c.clone());
        c
    }

    pub fn admin_set_flags(&mut self, user: UserId, is_admin: bool, is_blocked: bool) {
        if let Some(u) = self.0.get_mut().users.get_mut(&user) {
            u.profile.is_admin = is_admin;
            u.profile.is_blocked = is_blocked;
        }
    }

    /// Opens a session without going through the password check
    pub async fn impersonate(&self, username: &str) -> Result<Session, Error> {
        let mut st = self.0.lock().await;
        let u = st
            .users
            .values_mut()
            .find(|u| u.profile.username == username)
            .ok_or_else(Error::not_found)?;
        let token = AuthToken(format!("mock-{}", Uuid::new_v4()));
        u.sessions.insert(token.clone());
        Ok(Session {
            user: u.profile.id,
            token,
        })
    }

    /// Makes the next `n` writes fail as if the backend could not be reached
    pub async fn fail_next_writes(&self, n: usize) {
        self.0.lock().await.failing_writes = n;
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

impl State {
    fn resolve(&self, s: &Session) -> Result<&DbUser, Error> {
        match self.users.get(&s.user) {
            Some(u) if u.sessions.contains(&s.token) => Ok(u),
            _ => Err(Error::permission_denied()),
        }
    }

    fn auth(&self, s: &Session) -> Result<AuthInfo, Error> {
        Ok(AuthInfo::for_profile(&self.resolve(s)?.profile))
    }

    /// Entry point of every write, failing it when asked to
    fn write(&mut self, s: &Session) -> Result<AuthInfo, Error> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(Error::Anyhow(anyhow::anyhow!("injected write failure")));
        }
        self.auth(s)
    }

    fn require(&self, s: &Session, allowed: bool) -> Result<(), Error> {
        if allowed {
            return Ok(());
        }
        if self.resolve(s)?.profile.is_blocked {
            return Err(Error::user_blocked());
        }
        Err(Error::permission_denied())
    }

    fn embed(&self, mut p: Post) -> Post {
        p.author = self.users.get(&p.author_id).map(|u| u.profile.author());
        p.category = p
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(|c| c.to_ref());
        p
    }

    fn embed_comment(&self, mut c: Comment) -> Comment {
        c.author = self.users.get(&c.author_id).map(|u| u.profile.author());
        c
    }

    /// Non-deleted posts matching `keep`, newest first
    fn posts_where(&self, keep: impl Fn(&Post) -> bool) -> Vec<Post> {
        let mut res = self
            .posts
            .iter()
            .filter(|p| !p.is_deleted && keep(p))
            .cloned()
            .map(|p| self.embed(p))
            .collect::<Vec<_>>();
        res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        res
    }

    fn post_mut(&mut self, post: PostId) -> Result<&mut Post, Error> {
        self.posts
            .iter_mut()
            .find(|p| p.id == post && !p.is_deleted)
            .ok_or_else(Error::not_found)
    }

    fn comment_mut(&mut self, comment: CommentId) -> Result<&mut Comment, Error> {
        self.comments
            .iter_mut()
            .find(|c| c.id == comment && !c.is_deleted)
            .ok_or_else(Error::not_found)
    }

    fn profile_mut(&mut self, user: UserId) -> Result<&mut Profile, Error> {
        self.users
            .get_mut(&user)
            .map(|u| &mut u.profile)
            .ok_or_else(Error::not_found)
    }

    fn target_exists(&self, target: Target) -> bool {
        match target {
            Target::Post(p) => self.posts.iter().any(|x| x.id == p && !x.is_deleted),
            Target::Comment(c) => self.comments.iter().any(|x| x.id == c && !x.is_deleted),
        }
    }

    /// Scores are maintained by the backend out of the votes table
    fn rescore(&mut self, target: Target) {
        let score = self
            .votes
            .iter()
            .filter(|v| v.target() == Some(target))
            .map(|v| v.vote_type.value())
            .sum();
        match target {
            Target::Post(p) => {
                if let Some(p) = self.posts.iter_mut().find(|x| x.id == p) {
                    p.score = score;
                }
            }
            Target::Comment(c) => {
                if let Some(c) = self.comments.iter_mut().find(|x| x.id == c) {
                    c.score = score;
                }
            }
        }
    }

    fn recount_comments(&mut self, post: PostId) {
        let count = self
            .comments
            .iter()
            .filter(|c| c.post_id == post && !c.is_deleted)
            .count();
        if let Some(p) = self.posts.iter_mut().find(|p| p.id == post) {
            p.comments_count = count as i64;
        }
    }
}

#[async_trait]
impl Db for MockServer {
    async fn create_account(&self, r: &Registration) -> Result<UserId, Error> {
        r.validate()?;
        let mut st = self.0.lock().await;
        if st.users.values().any(|u| u.profile.username == r.username) {
            return Err(Error::name_already_used(r.username.clone()));
        }
        if st.users.values().any(|u| u.email == r.email) {
            return Err(Error::name_already_used(r.email.clone()));
        }
        let id = UserId(Uuid::new_v4());
        st.users.insert(
            id,
            DbUser {
                email: r.email.clone(),
                pass: r.password.clone(),
                profile: Profile {
                    id,
                    username: r.username.clone(),
                    first_name: Some(r.first_name.clone()),
                    last_name: Some(r.last_name.clone()),
                    avatar_url: None,
                    reputation: 0,
                    is_admin: false,
                    is_blocked: false,
                    created_at: api::now(),
                },
                sessions: HashSet::new(),
            },
        );
        Ok(id)
    }

    async fn sign_in(&self, s: &NewSession) -> Result<Session, Error> {
        s.validate()?;
        let mut st = self.0.lock().await;
        let u = st
            .users
            .values_mut()
            .find(|u| u.email == s.email && u.pass == s.password)
            .ok_or_else(Error::permission_denied)?;
        let token = AuthToken(format!("mock-{}", Uuid::new_v4()));
        u.sessions.insert(token.clone());
        Ok(Session {
            user: u.profile.id,
            token,
        })
    }

    async fn sign_out(&self, s: &Session) -> Result<(), Error> {
        let mut st = self.0.lock().await;
        st.resolve(s)?;
        if let Some(u) = st.users.get_mut(&s.user) {
            u.sessions.remove(&s.token);
        }
        Ok(())
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>, Error> {
        Ok(self.0.lock().await.posts_where(|_| true))
    }

    async fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        self.0
            .lock()
            .await
            .posts_where(|p| p.id == post)
            .pop()
            .ok_or_else(Error::not_found)
    }

    async fn fetch_posts_by_category(&self, slug: &str) -> Result<Vec<Post>, Error> {
        let st = self.0.lock().await;
        let Some(cat) = st.categories.iter().find(|c| c.slug == slug) else {
            return Ok(Vec::new());
        };
        Ok(st.posts_where(|p| p.category_id == Some(cat.id)))
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>, Error> {
        let mut res = self.0.lock().await.categories.clone();
        res.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(res)
    }

    async fn create_post(&self, s: &Session, p: &NewPost) -> Result<Post, Error> {
        p.validate()?;
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_post && p.author_id == s.user)?;
        if let Some(cat) = p.category_id {
            if !st.categories.iter().any(|c| c.id == cat) {
                return Err(Error::not_found());
            }
        }
        let post = Post {
            id: PostId(Uuid::new_v4()),
            author_id: p.author_id,
            category_id: p.category_id,
            title: p.title.clone(),
            content: p.content.clone(),
            score: 0,
            comments_count: 0,
            is_deleted: false,
            created_at: api::now(),
            updated_at: None,
            author: None,
            category: None,
        };
        st.posts.push(post.clone());
        Ok(st.embed(post))
    }

    async fn update_post(&self, s: &Session, post: PostId, u: &PostUpdate) -> Result<Post, Error> {
        u.validate()?;
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        let author = st.post_mut(post)?.author_id;
        st.require(s, auth.can_admin || (auth.can_post && author == s.user))?;
        let p = st.post_mut(post)?;
        u.apply_to(p, api::now());
        let p = p.clone();
        Ok(st.embed(p))
    }

    async fn delete_post(&self, s: &Session, post: PostId) -> Result<(), Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        let author = st.post_mut(post)?.author_id;
        st.require(s, auth.can_admin || (auth.can_post && author == s.user))?;
        st.post_mut(post)?.is_deleted = true;
        Ok(())
    }

    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        let st = self.0.lock().await;
        let mut res = st
            .comments
            .iter()
            .filter(|c| c.post_id == post && !c.is_deleted)
            .cloned()
            .map(|c| st.embed_comment(c))
            .collect::<Vec<_>>();
        res.sort_by_key(|c| c.created_at);
        Ok(res)
    }

    async fn create_comment(&self, s: &Session, c: &NewComment) -> Result<Comment, Error> {
        c.validate()?;
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_comment && c.author_id == s.user)?;
        st.post_mut(c.post_id)?;
        if let Some(parent) = c.parent_id {
            if !st
                .comments
                .iter()
                .any(|x| x.id == parent && x.post_id == c.post_id)
            {
                return Err(Error::not_found());
            }
        }
        let comment = Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: c.post_id,
            parent_id: c.parent_id,
            author_id: c.author_id,
            content: c.content.clone(),
            score: 0,
            created_at: api::now(),
            is_deleted: false,
            author: None,
        };
        st.comments.push(comment.clone());
        st.recount_comments(c.post_id);
        Ok(st.embed_comment(comment))
    }

    async fn update_comment(
        &self,
        s: &Session,
        comment: CommentId,
        content: &str,
    ) -> Result<Comment, Error> {
        Comment::validate_edit(content)?;
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        let author = st.comment_mut(comment)?.author_id;
        st.require(s, auth.can_comment && author == s.user)?;
        let c = st.comment_mut(comment)?;
        c.content = String::from(content);
        let c = c.clone();
        Ok(st.embed_comment(c))
    }

    async fn delete_comment(&self, s: &Session, comment: CommentId) -> Result<(), Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        let author = st.comment_mut(comment)?.author_id;
        st.require(s, auth.can_admin || (auth.can_comment && author == s.user))?;
        let c = st.comment_mut(comment)?;
        c.is_deleted = true;
        let post = c.post_id;
        st.recount_comments(post);
        Ok(())
    }

    async fn fetch_votes(&self, s: &Session, targets: &[Target]) -> Result<Vec<Vote>, Error> {
        let st = self.0.lock().await;
        st.resolve(s)?;
        Ok(st
            .votes
            .iter()
            .filter(|v| v.user_id == s.user)
            .filter(|v| v.target().map_or(false, |t| targets.contains(&t)))
            .cloned()
            .collect())
    }

    async fn upsert_vote(
        &self,
        s: &Session,
        target: Target,
        dir: VoteDirection,
    ) -> Result<Vote, Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_vote)?;
        if !st.target_exists(target) {
            return Err(Error::not_found());
        }
        let vote = Vote::new(s.user, target, dir);
        match st
            .votes
            .iter_mut()
            .find(|v| v.user_id == s.user && v.target() == Some(target))
        {
            Some(v) => *v = vote.clone(),
            None => st.votes.push(vote.clone()),
        }
        st.rescore(target);
        Ok(vote)
    }

    async fn remove_vote(&self, s: &Session, target: Target) -> Result<(), Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_vote)?;
        st.votes
            .retain(|v| !(v.user_id == s.user && v.target() == Some(target)));
        st.rescore(target);
        Ok(())
    }

    async fn fetch_tags(&self) -> Result<Vec<Tag>, Error> {
        let mut res = self.0.lock().await.tags.clone();
        res.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(res)
    }

    async fn fetch_tags_for_post(&self, post: PostId) -> Result<Vec<Tag>, Error> {
        let st = self.0.lock().await;
        Ok(st
            .post_tags
            .iter()
            .filter(|(p, _)| *p == post)
            .filter_map(|(_, t)| st.tags.iter().find(|x| x.id == *t))
            .cloned()
            .collect())
    }

    async fn add_tag_to_post(&self, s: &Session, post: PostId, name: &str) -> Result<Tag, Error> {
        let name = Tag::normalize_name(name)?;
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_post)?;
        st.post_mut(post)?;
        let tag = match st.tags.iter().find(|t| t.name == name) {
            Some(t) => t.clone(),
            None => {
                let t = Tag {
                    id: TagId(Uuid::new_v4()),
                    name,
                };
                st.tags.push(t.clone());
                t
            }
        };
        if !st.post_tags.contains(&(post, tag.id)) {
            st.post_tags.push((post, tag.id));
        }
        Ok(tag)
    }

    async fn remove_tag_from_post(
        &self,
        s: &Session,
        post: PostId,
        tag: TagId,
    ) -> Result<(), Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_post)?;
        st.post_tags.retain(|pt| *pt != (post, tag));
        Ok(())
    }

    async fn fetch_posts_by_tag(&self, name: &str) -> Result<Vec<Post>, Error> {
        let name = Tag::normalize_name(name)?;
        let st = self.0.lock().await;
        let Some(tag) = st.tags.iter().find(|t| t.name == name) else {
            return Ok(Vec::new());
        };
        Ok(st.posts_where(|p| st.post_tags.contains(&(p.id, tag.id))))
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Profile, Error> {
        let st = self.0.lock().await;
        st.users
            .get(&user)
            .map(|u| u.profile.clone())
            .ok_or_else(Error::not_found)
    }

    async fn fetch_profile_by_username(&self, username: &str) -> Result<Profile, Error> {
        let st = self.0.lock().await;
        st.users
            .values()
            .find(|u| u.profile.username == username)
            .map(|u| u.profile.clone())
            .ok_or_else(Error::not_found)
    }

    async fn update_profile(&self, s: &Session, u: &ProfileUpdate) -> Result<Profile, Error> {
        u.validate()?;
        let mut st = self.0.lock().await;
        st.write(s)?;
        if let Some(name) = &u.username {
            if st
                .users
                .values()
                .any(|x| x.profile.id != s.user && x.profile.username == *name)
            {
                return Err(Error::name_already_used(name.clone()));
            }
        }
        let p = st.profile_mut(s.user)?;
        u.apply_to(p);
        Ok(p.clone())
    }

    async fn top_profiles(&self, limit: usize) -> Result<Vec<ProfileSummary>, Error> {
        let st = self.0.lock().await;
        let mut res = st
            .users
            .values()
            .map(|u| u.profile.summary())
            .collect::<Vec<_>>();
        res.sort_by(|a, b| b.reputation.cmp(&a.reputation));
        res.truncate(limit);
        Ok(res)
    }

    async fn search_matching(&self, query: &str) -> Result<SearchResults, Error> {
        let q = query.to_lowercase();
        let matches = |s: &str| s.to_lowercase().contains(&q);
        let st = self.0.lock().await;
        let mut posts = st.posts_where(|p| matches(&p.title) || matches(&p.content));
        posts.truncate(SEARCH_LIMIT);
        Ok(SearchResults {
            posts,
            users: st
                .users
                .values()
                .filter(|u| matches(&u.profile.username))
                .map(|u| u.profile.summary())
                .take(SEARCH_LIMIT)
                .collect(),
            tags: st
                .tags
                .iter()
                .filter(|t| matches(&t.name))
                .map(|t| TagName {
                    name: t.name.clone(),
                })
                .take(SEARCH_LIMIT)
                .collect(),
        })
    }

    async fn list_profiles(
        &self,
        s: &Session,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Profile>, Error> {
        let st = self.0.lock().await;
        let auth = st.auth(s)?;
        st.require(s, auth.can_admin)?;
        let mut all = st
            .users
            .values()
            .map(|u| u.profile.clone())
            .collect::<Vec<_>>();
        all.sort_by_key(|p| p.created_at);
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .collect();
        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    async fn set_admin(&self, s: &Session, user: UserId, is_admin: bool) -> Result<Profile, Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_admin)?;
        let p = st.profile_mut(user)?;
        p.is_admin = is_admin;
        Ok(p.clone())
    }

    async fn set_blocked(
        &self,
        s: &Session,
        user: UserId,
        is_blocked: bool,
    ) -> Result<Profile, Error> {
        let mut st = self.0.lock().await;
        let auth = st.write(s)?;
        st.require(s, auth.can_admin)?;
        let p = st.profile_mut(user)?;
        p.is_blocked = is_blocked;
        Ok(p.clone())
    }

    async fn count_users(&self) -> Result<u64, Error> {
        Ok(self.0.lock().await.users.len() as u64)
    }

    async fn count_posts(&self) -> Result<u64, Error> {
        let st = self.0.lock().await;
        Ok(st.posts.iter().filter(|p| !p.is_deleted).count() as u64)
    }

    async fn count_comments(&self) -> Result<u64, Error> {
        let st = self.0.lock().await;
        Ok(st.comments.iter().filter(|c| !c.is_deleted).count() as u64)
    }
}
