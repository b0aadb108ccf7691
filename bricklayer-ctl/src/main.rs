use std::path::{Path, PathBuf};

use anyhow::Context;
use bricklayer_client::{
    api::{
        AuthToken, CommentId, NewPost, NewSession, Post, PostId, Registration, Session, Tag,
        UserId, Uuid, VoteDirection,
    },
    list_users, toggle_admin, toggle_blocked, walk_forest, Db, RestDb, Thread,
};
use bricklayer_mock_server::MockServer;

/// Number of profiles shown by the community spotlight
const SPOTLIGHT_SIZE: usize = 5;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Project URL of the hosted backend
    #[structopt(short, long, env = "BRICKLAYER_URL")]
    host: Option<String>,

    /// Public API key of the hosted backend
    #[structopt(long, env = "BRICKLAYER_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Work on an in-memory backend loaded from this fixture file
    #[structopt(long, parse(from_os_str))]
    mock: Option<PathBuf>,

    /// With --mock, act as this user
    #[structopt(long)]
    as_user: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Register a new user
    SignUp {
        username: String,
        first_name: String,
        last_name: String,
        email: String,
        password: String,
        confirm_password: String,
    },

    /// Sign in, printing the session to export
    Login { email: String, password: String },

    /// Invalidate the current session
    Logout,

    /// List posts, newest first
    Posts {
        #[structopt(long)]
        category: Option<String>,

        #[structopt(long)]
        tag: Option<String>,
    },

    /// List categories
    Categories,

    /// Show a post with its discussion
    Thread { post: Uuid },

    /// Create a post
    Post {
        title: String,
        content: String,

        /// Category slug
        #[structopt(long)]
        category: Option<String>,
    },

    /// Comment on a post, or reply to a comment with --parent
    Reply {
        post: Uuid,
        text: String,

        #[structopt(long)]
        parent: Option<Uuid>,
    },

    /// Upvote (or with --down, downvote) a post or one of its comments;
    /// voting the same way twice withdraws the vote
    Vote {
        post: Uuid,

        #[structopt(long)]
        comment: Option<Uuid>,

        #[structopt(long)]
        down: bool,
    },

    /// Add a tag to a post
    Tag { post: Uuid, name: String },

    /// Remove a tag from a post
    Untag { post: Uuid, name: String },

    /// Search posts, users and tags
    Search { query: String },

    /// Show a user's profile
    Profile { username: String },

    /// Show the users with the highest reputation
    Spotlight,

    /// Show user, post and comment counts
    Stats,

    Admin(AdminCommand),
}

#[derive(structopt::StructOpt)]
enum AdminCommand {
    /// List users, 1-based page
    Users {
        #[structopt(default_value = "1")]
        page: usize,
    },

    /// Grant or revoke admin rights
    ToggleAdmin { user: Uuid },

    /// Block or unblock a user
    ToggleBlock { user: Uuid },
}

fn env_session() -> anyhow::Result<Option<Session>> {
    let Ok(token) = std::env::var("BRICKLAYER_TOKEN") else {
        return Ok(None);
    };
    let user = std::env::var("BRICKLAYER_USER")
        .context("BRICKLAYER_TOKEN is set, retrieving BRICKLAYER_USER environment variable")?;
    let user = Uuid::try_parse(&user).context("parsing BRICKLAYER_USER as a user id")?;
    Ok(Some(Session {
        user: UserId(user),
        token: AuthToken(token),
    }))
}

/// Where commands are sent
enum Backend {
    Rest(RestDb),

    /// In-memory backend, saved back to its fixture file after each command
    Mock { server: MockServer, fixture: PathBuf },
}

impl Backend {
    fn db(&self) -> &dyn Db {
        match self {
            Backend::Rest(db) => db,
            Backend::Mock { server, .. } => server,
        }
    }

    async fn persist(&self) -> anyhow::Result<()> {
        if let Backend::Mock { server, fixture } = self {
            save_fixture(server, fixture).await?;
        }
        Ok(())
    }
}

fn load_fixture(path: &Path) -> anyhow::Result<MockServer> {
    let data =
        std::fs::read(path).with_context(|| format!("reading fixture file {}", path.display()))?;
    let fixture = serde_json::from_slice(&data)
        .with_context(|| format!("parsing fixture file {}", path.display()))?;
    Ok(MockServer::from_fixture(fixture))
}

async fn save_fixture(server: &MockServer, path: &Path) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(&server.fixture().await).context("serializing fixture")?;
    std::fs::write(path, data)
        .with_context(|| format!("writing fixture file {}", path.display()))?;
    tracing::debug!(fixture = %path.display(), "saved in-memory backend");
    Ok(())
}

async fn connect(opt: &Opt) -> anyhow::Result<(Backend, Option<Session>)> {
    match &opt.mock {
        Some(path) => {
            let server = load_fixture(path)?;
            let session = match &opt.as_user {
                Some(username) => Some(
                    server
                        .impersonate(username)
                        .await
                        .with_context(|| format!("impersonating {username}"))?,
                ),
                None => None,
            };
            tracing::info!(fixture = %path.display(), "using in-memory backend");
            let backend = Backend::Mock {
                server,
                fixture: path.clone(),
            };
            Ok((backend, session))
        }
        None => {
            let host = opt
                .host
                .as_deref()
                .context("either --host, BRICKLAYER_URL or --mock is required")?;
            Ok((
                Backend::Rest(RestDb::new(host, opt.api_key.clone())),
                env_session()?,
            ))
        }
    }
}

fn print_posts(posts: &[Post]) {
    for p in posts {
        let category = p.category.as_ref().map(|c| &c.name as &str).unwrap_or("-");
        println!(
            "{}  {:>4}  {:>3} comments  [{category}]  {} by {}",
            p.id.0,
            p.score,
            p.comments_count,
            p.title,
            p.author_name()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let (backend, session) = connect(&opt).await?;
    run(backend.db(), session.as_ref(), opt.cmd).await?;
    backend.persist().await
}

async fn run(db: &dyn Db, session: Option<&Session>, cmd: Command) -> anyhow::Result<()> {
    let signed_in = || session.context("this command needs a signed-in user");

    match cmd {
        Command::SignUp {
            username,
            first_name,
            last_name,
            email,
            password,
            confirm_password,
        } => {
            let user = db
                .sign_up(&Registration {
                    username,
                    first_name,
                    last_name,
                    email,
                    password,
                    confirm_password,
                })
                .await?;
            println!("registered user {}", user.0);
        }
        Command::Login { email, password } => {
            let s = db.sign_in(&NewSession { email, password }).await?;
            println!("BRICKLAYER_USER={}", s.user.0);
            println!("BRICKLAYER_TOKEN={}", s.token.0);
        }
        Command::Logout => db.sign_out(signed_in()?).await?,
        Command::Posts { category, tag } => {
            let posts = match (category, tag) {
                (Some(_), Some(_)) => anyhow::bail!("filter on either a category or a tag"),
                (Some(slug), None) => db.fetch_posts_by_category(&slug).await?,
                (None, Some(tag)) => db.fetch_posts_by_tag(&tag).await?,
                (None, None) => db.fetch_posts().await?,
            };
            print_posts(&posts);
        }
        Command::Categories => {
            for c in db.fetch_categories().await? {
                println!("{}  {}", c.slug, c.name);
            }
        }
        Command::Thread { post } => {
            let thread = Thread::load(db, PostId(post), session).await?;
            let tags = db.fetch_tags_for_post(PostId(post)).await?;
            let p = &thread.post;
            println!("{} ({} points, by {})", p.title, thread.post_vote.score, p.author_name());
            if !tags.is_empty() {
                let names = tags.iter().map(|t| &t.name as &str).collect::<Vec<_>>();
                println!("tags: {}", names.join(", "));
            }
            println!("\n{}\n", p.content);
            for (depth, node) in walk_forest(&thread.comments) {
                let c = &node.comment;
                let score = thread.comment_score(c.id).unwrap_or(c.score);
                println!(
                    "{:indent$}[{score}] {}: {}  ({})",
                    "",
                    c.author_name(),
                    c.content,
                    c.id.0,
                    indent = depth * 2
                );
            }
            println!("\n{} comments", thread.comment_count());
        }
        Command::Post {
            title,
            content,
            category,
        } => {
            let s = signed_in()?;
            let category_id = match category {
                None => None,
                Some(slug) => Some(
                    db.fetch_categories()
                        .await?
                        .into_iter()
                        .find(|c| c.slug == slug)
                        .map(|c| c.id)
                        .with_context(|| format!("no category with slug {slug:?}"))?,
                ),
            };
            let p = db
                .create_post(
                    s,
                    &NewPost {
                        author_id: s.user,
                        category_id,
                        title,
                        content,
                    },
                )
                .await?;
            println!("created post {}", p.id.0);
        }
        Command::Reply { post, text, parent } => {
            let s = signed_in()?;
            let mut thread = Thread::load(db, PostId(post), Some(s)).await?;
            let c = thread
                .reply(db, s, parent.map(CommentId), &text)
                .await?;
            println!("created comment {}", c.id.0);
        }
        Command::Vote {
            post,
            comment,
            down,
        } => {
            let s = signed_in()?;
            let dir = match down {
                true => VoteDirection::Down,
                false => VoteDirection::Up,
            };
            let mut thread = Thread::load(db, PostId(post), Some(s)).await?;
            let (transition, local) = match comment.map(CommentId) {
                None => {
                    let t = thread.vote_post(db, s, dir).await?;
                    (t, thread.post_vote)
                }
                Some(c) => {
                    let t = thread.vote_comment(db, s, c, dir).await?;
                    (t, thread.comment_votes[&c])
                }
            };
            println!(
                "vote is now {:?}, score {} ({:+})",
                transition.next_vote, local.score, transition.score_delta
            );
        }
        Command::Tag { post, name } => {
            let t = db.add_tag_to_post(signed_in()?, PostId(post), &name).await?;
            println!("tagged with {}", t.name);
        }
        Command::Untag { post, name } => {
            let name = Tag::normalize_name(&name)?;
            let tag = db
                .fetch_tags_for_post(PostId(post))
                .await?
                .into_iter()
                .find(|t| t.name == name)
                .with_context(|| format!("post is not tagged {name:?}"))?;
            db.remove_tag_from_post(signed_in()?, PostId(post), tag.id)
                .await?;
        }
        Command::Search { query } => {
            let res = db.search(&query).await?;
            if res.is_empty() {
                println!("no results");
            }
            print_posts(&res.posts);
            for u in res.users {
                println!("user {} ({} reputation)", u.username, u.reputation);
            }
            for t in res.tags {
                println!("tag {}", t.name);
            }
        }
        Command::Profile { username } => {
            let p = db.fetch_profile_by_username(&username).await?;
            println!("{}  {}", p.id.0, p.username);
            let name = [p.first_name.as_deref(), p.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            println!("name: {name}");
            println!("reputation: {}", p.reputation);
            println!("member since: {}", p.created_at.format("%Y-%m-%d"));
            if p.is_admin {
                println!("admin");
            }
            if p.is_blocked {
                println!("blocked");
            }
        }
        Command::Spotlight => {
            for (i, p) in db.top_profiles(SPOTLIGHT_SIZE).await?.iter().enumerate() {
                println!("{}. {} ({} reputation)", i + 1, p.username, p.reputation);
            }
        }
        Command::Stats => {
            let stats = db.stats().await?;
            println!("users: {}", stats.users);
            println!("posts: {}", stats.posts);
            println!("comments: {}", stats.comments);
        }
        Command::Admin(cmd) => {
            let s = signed_in()?;
            match cmd {
                AdminCommand::Users { page } => {
                    let page = list_users(db, s, page.saturating_sub(1)).await?;
                    for p in &page.items {
                        let flags = match (p.is_admin, p.is_blocked) {
                            (true, true) => "admin, blocked",
                            (true, false) => "admin",
                            (false, true) => "blocked",
                            (false, false) => "",
                        };
                        println!("{}  {}  {flags}", p.id.0, p.username);
                    }
                    println!(
                        "page {} of {} ({} users)",
                        page.page + 1,
                        page.total_pages(),
                        page.total
                    );
                }
                AdminCommand::ToggleAdmin { user } => {
                    let p = toggle_admin(db, s, UserId(user)).await?;
                    println!("{} is admin: {}", p.username, p.is_admin);
                }
                AdminCommand::ToggleBlock { user } => {
                    let p = toggle_blocked(db, s, UserId(user)).await?;
                    println!("{} is blocked: {}", p.username, p.is_blocked);
                }
            }
        }
    }

    Ok(())
}
