use std::collections::HashSet;

use bricklayer_client::api::{
    Category, CategoryId, Comment, CommentId, Post, PostId, Profile, Tag, TagId, Target, Time,
    UserId, Vote, VoteDirection,
};
use bricklayer_mock_server::{Fixture, FixtureUser};
use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 12;

const CATEGORIES: &[(&str, &str)] = &[
    ("MOCs", "mocs"),
    ("Technic", "technic"),
    ("Star Wars", "star-wars"),
    ("Collecting", "collecting"),
    ("Help & Advice", "help"),
];

const NUM_TAGS: usize = 15;
const NUM_POST_TAGS: usize = 120;

const NUM_POSTS: usize = 60;
const POST_TITLE_LEN: usize = 6;
const POST_CONTENT_LEN: usize = 80;

const NUM_COMMENTS: usize = 400;
const COMMENT_LEN: usize = 25;
const REPLY_PROBABILITY: f64 = 0.6;

const NUM_VOTES: usize = 900;

const HISTORY_DAYS: i64 = 90;

fn gen_date(rng: &mut impl Rng, after: Time) -> Time {
    let span = (Utc::now() - after).num_seconds().max(1);
    after + Duration::seconds(rng.gen_range(0..span))
}

fn main() {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::days(HISTORY_DAYS);

    // Generate users, the first one being an admin
    let users = (0..NUM_USERS)
        .map(|i| FixtureUser {
            email: format!("builder{i}@example.org"),
            password: format!("bricks{i}"),
            profile: Profile {
                id: UserId(Uuid::new_v4()),
                username: format!("builder{i}"),
                first_name: Some(lipsum::lipsum_words(1)),
                last_name: Some(lipsum::lipsum_words(1)),
                avatar_url: None,
                reputation: rng.gen_range(0..500),
                is_admin: i == 0,
                is_blocked: false,
                created_at: gen_date(&mut rng, start),
            },
        })
        .collect::<Vec<_>>();
    let user_ids = users.iter().map(|u| u.profile.id).collect::<Vec<_>>();

    let categories = CATEGORIES
        .iter()
        .map(|(name, slug)| Category {
            id: CategoryId(Uuid::new_v4()),
            name: String::from(*name),
            slug: String::from(*slug),
        })
        .collect::<Vec<_>>();

    // Generate tags, deduplicating the random words
    let mut tag_names = HashSet::new();
    while tag_names.len() < NUM_TAGS {
        tag_names.insert(lipsum::lipsum_words(1).to_lowercase().replace(['.', ','], ""));
    }
    let tags = tag_names
        .into_iter()
        .map(|name| Tag {
            id: TagId(Uuid::new_v4()),
            name,
        })
        .collect::<Vec<_>>();

    // Generate posts
    let mut posts = (0..NUM_POSTS)
        .map(|_| Post {
            id: PostId(Uuid::new_v4()),
            author_id: *user_ids.choose(&mut rng).expect("there are users"),
            category_id: categories.choose(&mut rng).map(|c| c.id),
            title: lipsum::lipsum_title()
                .split_whitespace()
                .take(POST_TITLE_LEN)
                .collect::<Vec<_>>()
                .join(" "),
            content: lipsum::lipsum_words_from_seed(POST_CONTENT_LEN, rng.gen()),
            score: 0,
            comments_count: 0,
            is_deleted: rng.gen_bool(0.05),
            created_at: gen_date(&mut rng, start),
            updated_at: None,
            author: None,
            category: None,
        })
        .collect::<Vec<_>>();

    let mut post_tags = HashSet::new();
    for _ in 0..NUM_POST_TAGS {
        let p = posts.choose(&mut rng).expect("there are posts").id;
        let t = tags.choose(&mut rng).expect("there are tags").id;
        post_tags.insert((p, t));
    }

    // Generate comments, replies always coming after the comment they answer
    let mut comments: Vec<Comment> = Vec::with_capacity(NUM_COMMENTS);
    for _ in 0..NUM_COMMENTS {
        let post = posts.choose(&mut rng).expect("there are posts");
        let parent = if rng.gen_bool(REPLY_PROBABILITY) {
            comments
                .iter()
                .filter(|c| c.post_id == post.id)
                .collect::<Vec<_>>()
                .choose(&mut rng)
                .map(|c| (c.id, c.created_at))
        } else {
            None
        };
        let after = parent.map(|(_, date)| date).unwrap_or(post.created_at);
        comments.push(Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: post.id,
            parent_id: parent.map(|(id, _)| id),
            author_id: *user_ids.choose(&mut rng).expect("there are users"),
            content: lipsum::lipsum_words_from_seed(COMMENT_LEN, rng.gen()),
            score: 0,
            created_at: gen_date(&mut rng, after),
            is_deleted: rng.gen_bool(0.03),
            author: None,
        });
    }

    // Generate votes, at most one per user and target
    let mut seen = HashSet::new();
    let mut votes = Vec::new();
    for _ in 0..NUM_VOTES {
        let user = *user_ids.choose(&mut rng).expect("there are users");
        let target = if rng.gen_bool(0.4) {
            Target::Post(posts.choose(&mut rng).expect("there are posts").id)
        } else {
            Target::Comment(comments.choose(&mut rng).expect("there are comments").id)
        };
        if !seen.insert((user, target)) {
            continue;
        }
        let dir = if rng.gen_bool(0.8) {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        };
        votes.push(Vote::new(user, target, dir));
    }

    // Denormalized counters, as the backend would maintain them
    for p in posts.iter_mut() {
        p.score = votes
            .iter()
            .filter(|v| v.target() == Some(Target::Post(p.id)))
            .map(|v| v.vote_type.value())
            .sum();
        p.comments_count = comments
            .iter()
            .filter(|c| c.post_id == p.id && !c.is_deleted)
            .count() as i64;
    }
    for c in comments.iter_mut() {
        c.score = votes
            .iter()
            .filter(|v| v.target() == Some(Target::Comment(c.id)))
            .map(|v| v.vote_type.value())
            .sum();
    }

    let fixture = Fixture {
        users,
        categories,
        posts,
        comments,
        votes,
        tags,
        post_tags: post_tags.into_iter().collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&fixture).expect("serializing fixture")
    );
}
