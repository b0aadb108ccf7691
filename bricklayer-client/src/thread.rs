use std::collections::HashMap;

use crate::{
    api::{Comment, CommentId, NewComment, Post, PostId, Session, Target, VoteDirection},
    build_tree, cast_vote, count_nodes, CommentNode, Db, Error, LocalVote, VoteTransition,
};

/// A post with its discussion, as seen by one viewer
#[derive(Clone, Debug)]
pub struct Thread {
    pub post: Post,
    pub comments: Vec<CommentNode<Comment>>,
    pub post_vote: LocalVote,
    pub comment_votes: HashMap<CommentId, LocalVote>,
}

impl Thread {
    /// Loads a post and its comments, along with the viewer's votes when
    /// signed in
    pub async fn load<D: Db + ?Sized>(
        db: &D,
        post: PostId,
        viewer: Option<&Session>,
    ) -> Result<Thread, Error> {
        let (post, comments) = futures::try_join!(db.fetch_post(post), db.fetch_comments(post))?;
        let mut thread = Thread {
            post_vote: LocalVote::new(post.score, Default::default()),
            post,
            comments: Vec::new(),
            comment_votes: HashMap::new(),
        };
        thread.set_comments(comments);
        if let Some(viewer) = viewer {
            thread.load_votes(db, viewer).await?;
        }
        Ok(thread)
    }

    fn set_comments(&mut self, mut comments: Vec<Comment>) {
        comments.retain(|c| !c.is_deleted);
        comments.sort_by_key(|c| c.created_at);
        self.comment_votes = comments
            .iter()
            .map(|c| {
                let state = self
                    .comment_votes
                    .get(&c.id)
                    .map(|v| v.state)
                    .unwrap_or_default();
                (c.id, LocalVote::new(c.score, state))
            })
            .collect();
        self.comments = build_tree(comments);
    }

    async fn load_votes<D: Db + ?Sized>(&mut self, db: &D, viewer: &Session) -> Result<(), Error> {
        let mut targets = vec![Target::Post(self.post.id)];
        targets.extend(self.comment_votes.keys().map(|&c| Target::Comment(c)));
        for vote in db.fetch_votes(viewer, &targets).await? {
            let local = match vote.target() {
                Some(Target::Post(p)) if p == self.post.id => &mut self.post_vote,
                Some(Target::Comment(c)) => match self.comment_votes.get_mut(&c) {
                    Some(local) => local,
                    None => continue,
                },
                _ => {
                    tracing::warn!(?vote, "ignoring vote not belonging to this thread");
                    continue;
                }
            };
            local.state = vote.vote_type.into();
        }
        Ok(())
    }

    /// Fetches the comments again, keeping the viewer's known votes
    pub async fn refresh_comments<D: Db + ?Sized>(&mut self, db: &D) -> Result<(), Error> {
        let comments = db.fetch_comments(self.post.id).await?;
        self.set_comments(comments);
        Ok(())
    }

    /// Replies to the post itself when `parent` is `None`, to a comment
    /// otherwise, then refreshes the discussion
    pub async fn reply<D: Db + ?Sized>(
        &mut self,
        db: &D,
        s: &Session,
        parent: Option<CommentId>,
        text: &str,
    ) -> Result<Comment, Error> {
        let c = NewComment {
            post_id: self.post.id,
            parent_id: parent,
            author_id: s.user,
            content: String::from(text.trim()),
        };
        c.validate()?;
        let created = db.create_comment(s, &c).await?;
        self.refresh_comments(db).await?;
        Ok(created)
    }

    pub async fn vote_post<D: Db + ?Sized>(
        &mut self,
        db: &D,
        s: &Session,
        dir: VoteDirection,
    ) -> Result<VoteTransition, Error> {
        cast_vote(db, s, self.post.id, &mut self.post_vote, dir).await
    }

    pub async fn vote_comment<D: Db + ?Sized>(
        &mut self,
        db: &D,
        s: &Session,
        comment: CommentId,
        dir: VoteDirection,
    ) -> Result<VoteTransition, Error> {
        let local = self
            .comment_votes
            .get_mut(&comment)
            .ok_or_else(Error::not_found)?;
        cast_vote(db, s, comment, local, dir).await
    }

    /// Displayed score of a comment, including the viewer's pending votes
    pub fn comment_score(&self, comment: CommentId) -> Option<i64> {
        self.comment_votes.get(&comment).map(|v| v.score)
    }

    pub fn comment_count(&self) -> usize {
        count_nodes(&self.comments)
    }
}
