#![allow(dead_code)]

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use ormgen::preload::{self, Through};
use ormgen::Dialect;
use ormgen::prelude::*;
use sqlx::Sqlite;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};

const SCHEMA: &[&str] = &[
    "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        bio TEXT NOT NULL
    )",
    "CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        editor_id INTEGER,
        title TEXT NOT NULL
    )",
    "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE post_tags (post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL)",
];

/// In-memory SQLite with the test schema. One connection keeps every
/// statement on the same memory database.
pub async fn setup_db(dialect: &'static dyn Dialect) -> Db<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("pool");
    let db = Db::new(pool, dialect);
    for ddl in SCHEMA {
        db.executor()
            .execute("ddl", "schema", ddl, vec![])
            .await
            .expect("ddl");
    }
    db
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).expect("timestamp")
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

impl Item {
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_owned(),
        }
    }
}

impl Model<Sqlite> for Item {
    fn table_name() -> &'static str {
        "items"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(2);
        let mut vals = Vec::with_capacity(2);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.push("name");
        vals.push(BindValue::from(&self.name));
        (cols, vals)
    }

    fn key_setter() -> Option<fn(&mut Self, i64)> {
        Some(|item, id| item.id = id)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub posts: Vec<Post>,
    #[sqlx(skip)]
    pub profile: Option<Profile>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_owned(),
            email: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            posts: Vec::new(),
            profile: None,
        }
    }
}

fn preload_user_posts<'e>(
    exec: Executor<'e, Sqlite>,
    users: &'e mut [User],
) -> BoxFuture<'e, OrmResult<()>> {
    Box::pin(preload::has_many(
        exec,
        users,
        "user_id",
        |u: &User| u.id,
        |p: &Post| p.user_id,
        |u: &mut User, posts: Vec<Post>| u.posts = posts,
    ))
}

fn preload_user_profile<'e>(
    exec: Executor<'e, Sqlite>,
    users: &'e mut [User],
) -> BoxFuture<'e, OrmResult<()>> {
    Box::pin(preload::has_one(
        exec,
        users,
        "user_id",
        |u: &User| u.id,
        |p: &Profile| p.user_id,
        |u: &mut User, profile: Option<Profile>| u.profile = profile,
    ))
}

impl Model<Sqlite> for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name", "email", "created_at", "updated_at"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(5);
        let mut vals = Vec::with_capacity(5);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.extend(["name", "email", "created_at", "updated_at"]);
        vals.push(BindValue::from(&self.name));
        vals.push(BindValue::from(self.email.clone()));
        vals.push(BindValue::from(self.created_at));
        vals.push(BindValue::from(self.updated_at));
        (cols, vals)
    }

    fn key_setter() -> Option<fn(&mut Self, i64)> {
        Some(|user, id| user.id = id)
    }

    fn relations() -> Relations<Self, Sqlite> {
        Relations::new()
            .relation(&Relation::has_many("Posts", "posts", "user_id"))
            .preloader("Posts", preload_user_posts)
            .preloader("Profile", preload_user_profile)
    }

    fn timestamps() -> Timestamps<Self> {
        Timestamps::<Self>::none()
            .created(&["created_at"], |user, now| {
                if user.created_at == DateTime::<Utc>::UNIX_EPOCH {
                    user.created_at = now;
                }
            })
            .updated(&["updated_at"], |user, now| user.updated_at = now)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
}

impl Model<Sqlite> for Profile {
    fn table_name() -> &'static str {
        "profiles"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "user_id", "bio"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(3);
        let mut vals = Vec::with_capacity(3);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.extend(["user_id", "bio"]);
        vals.push(BindValue::from(self.user_id));
        vals.push(BindValue::from(&self.bio));
        (cols, vals)
    }

    fn key_setter() -> Option<fn(&mut Self, i64)> {
        Some(|profile, id| profile.id = id)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub editor_id: Option<i64>,
    pub title: String,
    #[sqlx(skip)]
    pub author: Option<User>,
    #[sqlx(skip)]
    pub editor: Option<User>,
    #[sqlx(skip)]
    pub tags: Vec<Tag>,
}

impl Post {
    pub fn new(user_id: i64, title: &str) -> Self {
        Self {
            id: 0,
            user_id,
            editor_id: None,
            title: title.to_owned(),
            author: None,
            editor: None,
            tags: Vec::new(),
        }
    }
}

fn preload_post_author<'e>(
    exec: Executor<'e, Sqlite>,
    posts: &'e mut [Post],
) -> BoxFuture<'e, OrmResult<()>> {
    Box::pin(preload::belongs_to(
        exec,
        posts,
        "id",
        |p: &Post| Some(p.user_id),
        |u: &User| u.id,
        |p: &mut Post, user: Option<User>| p.author = user,
    ))
}

fn preload_post_editor<'e>(
    exec: Executor<'e, Sqlite>,
    posts: &'e mut [Post],
) -> BoxFuture<'e, OrmResult<()>> {
    Box::pin(preload::belongs_to(
        exec,
        posts,
        "id",
        |p: &Post| p.editor_id,
        |u: &User| u.id,
        |p: &mut Post, user: Option<User>| p.editor = user,
    ))
}

fn preload_post_tags<'e>(
    exec: Executor<'e, Sqlite>,
    posts: &'e mut [Post],
) -> BoxFuture<'e, OrmResult<()>> {
    Box::pin(preload::many_to_many(
        exec,
        posts,
        Through {
            join_table: "post_tags",
            foreign_key: "post_id",
            references: "tag_id",
            target_key: "id",
        },
        |p: &Post| p.id,
        |t: &Tag| t.id,
        |p: &mut Post, tags: Vec<Tag>| p.tags = tags,
    ))
}

impl Model<Sqlite> for Post {
    fn table_name() -> &'static str {
        "posts"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "user_id", "editor_id", "title"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(4);
        let mut vals = Vec::with_capacity(4);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.extend(["user_id", "editor_id", "title"]);
        vals.push(BindValue::from(self.user_id));
        vals.push(BindValue::from(self.editor_id));
        vals.push(BindValue::from(&self.title));
        (cols, vals)
    }

    fn key_setter() -> Option<fn(&mut Self, i64)> {
        Some(|post, id| post.id = id)
    }

    fn relations() -> Relations<Self, Sqlite> {
        Relations::new()
            .relation(&Relation::belongs_to("Author", "users", "user_id").select_columns(&["name"]))
            .preloader("Author", preload_post_author)
            .preloader("Editor", preload_post_editor)
            .preloader("Tags", preload_post_tags)
    }
}

/// A post read together with its author's name through the `Author` join.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    #[sqlx(rename = "Author__name")]
    pub author_name: String,
}

impl Model<Sqlite> for PostSummary {
    fn table_name() -> &'static str {
        "posts"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "title"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(2);
        let mut vals = Vec::with_capacity(2);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.push("title");
        vals.push(BindValue::from(&self.title));
        (cols, vals)
    }

    fn relations() -> Relations<Self, Sqlite> {
        Relations::new()
            .relation(&Relation::belongs_to("Author", "users", "user_id").select_columns(&["name"]))
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Model<Sqlite> for Tag {
    fn table_name() -> &'static str {
        "tags"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
        let mut cols = Vec::with_capacity(2);
        let mut vals = Vec::with_capacity(2);
        if include_pk {
            cols.push("id");
            vals.push(BindValue::from(self.id));
        }
        cols.push("name");
        vals.push(BindValue::from(&self.name));
        (cols, vals)
    }
}

pub struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captures DEBUG output on the current thread until the guard drops.
pub fn capture_logs() -> (Arc<Mutex<Vec<u8>>>, tracing::subscriber::DefaultGuard) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let make_writer = {
        let buffer = buffer.clone();
        move || TestWriter(buffer.clone())
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(make_writer)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

pub fn logged(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().expect("lock").clone()).expect("utf8")
}

/// Number of statements logged for `operation` against `table`.
pub fn statements(logs: &str, operation: &str, table: &str) -> usize {
    let needle = format!("operation=\"{}\" table=\"{}\"", operation, table);
    logs.lines()
        .filter(|line| line.contains("ormgen query") && line.contains(&needle))
        .count()
}
