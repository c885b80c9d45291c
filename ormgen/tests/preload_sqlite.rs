#![cfg(feature = "sqlite")]

mod common;

use common::{Post, Profile, Tag, User, capture_logs, logged, setup_db, statements};
use ormgen::prelude::*;

async fn seed_user(db: &Db<sqlx::Sqlite>, name: &str) -> User {
    let mut user = User::new(name);
    User::find(db).create(&mut user).await.expect("user");
    user
}

async fn seed_post(db: &Db<sqlx::Sqlite>, user_id: i64, title: &str) -> Post {
    let mut post = Post::new(user_id, title);
    Post::find(db).create(&mut post).await.expect("post");
    post
}

#[tokio::test]
async fn has_many_groups_children_by_parent() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    let bob = seed_user(&db, "bob").await;
    let carol = seed_user(&db, "carol").await;
    seed_post(&db, alice.id, "a1").await;
    seed_post(&db, bob.id, "b1").await;
    seed_post(&db, alice.id, "a2").await;

    let users = User::find(&db)
        .order_by("id")
        .preload("Posts")
        .all()
        .await
        .expect("users");

    let titles = |u: &User| {
        let mut t: Vec<String> = u.posts.iter().map(|p| p.title.clone()).collect();
        t.sort();
        t
    };
    assert_eq!(users.len(), 3);
    assert_eq!(titles(&users[0]), ["a1", "a2"]);
    assert_eq!(titles(&users[1]), ["b1"]);
    assert_eq!(users[2].id, carol.id);
    assert!(users[2].posts.is_empty());
}

#[tokio::test]
async fn has_one_assigns_at_most_one_child() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    seed_user(&db, "bob").await;
    let mut profile = Profile {
        id: 0,
        user_id: alice.id,
        bio: "hello".to_owned(),
    };
    Profile::find(&db).create(&mut profile).await.expect("profile");

    let users = User::find(&db)
        .order_by("id")
        .preload("Profile")
        .all()
        .await
        .expect("users");
    assert_eq!(users[0].profile.as_ref(), Some(&profile));
    assert_eq!(users[1].profile, None);
}

#[tokio::test]
async fn belongs_to_loads_each_target_once() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    let bob = seed_user(&db, "bob").await;
    seed_post(&db, alice.id, "a1").await;
    seed_post(&db, alice.id, "a2").await;
    seed_post(&db, bob.id, "b1").await;

    let (buffer, _guard) = capture_logs();
    let posts = Post::find(&db)
        .order_by("id")
        .preload("Author")
        .all()
        .await
        .expect("posts");

    let authors: Vec<&str> = posts
        .iter()
        .map(|p| p.author.as_ref().map(|u| u.name.as_str()).unwrap_or_default())
        .collect();
    assert_eq!(authors, ["alice", "alice", "bob"]);

    let logs = logged(&buffer);
    assert_eq!(statements(&logs, "select", "posts"), 1);
    assert_eq!(statements(&logs, "select", "users"), 1);
}

#[tokio::test]
async fn belongs_to_skips_missing_optional_keys() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    let editor = seed_user(&db, "editor").await;
    let mut edited = Post::new(alice.id, "edited");
    edited.editor_id = Some(editor.id);
    Post::find(&db).create(&mut edited).await.expect("edited");
    seed_post(&db, alice.id, "draft").await;

    let posts = Post::find(&db)
        .order_by("id")
        .preload("Editor")
        .all()
        .await
        .expect("posts");
    assert_eq!(posts[0].editor.as_ref().map(|u| u.id), Some(editor.id));
    assert!(posts[1].editor.is_none());
}

#[tokio::test]
async fn belongs_to_without_any_key_sends_no_query() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    seed_post(&db, alice.id, "draft").await;

    let (buffer, _guard) = capture_logs();
    let posts = Post::find(&db)
        .preload("Editor")
        .all()
        .await
        .expect("posts");
    assert!(posts[0].editor.is_none());
    assert_eq!(statements(&logged(&buffer), "select", "users"), 0);
}

#[tokio::test]
async fn many_to_many_uses_two_queries_for_any_parent_count() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    let first = seed_post(&db, alice.id, "first").await;
    let second = seed_post(&db, alice.id, "second").await;
    for (id, name) in [(10, "ten"), (20, "twenty")] {
        let mut tag = Tag {
            id,
            name: name.to_owned(),
        };
        Tag::find(&db).create(&mut tag).await.expect("tag");
    }
    db.executor()
        .execute(
            "seed",
            "post_tags",
            "INSERT INTO post_tags (post_id, tag_id) VALUES ($1, 10), ($2, 20), ($3, 20)",
            vec![first.id.into(), first.id.into(), second.id.into()],
        )
        .await
        .expect("links");

    let (buffer, _guard) = capture_logs();
    let posts = Post::find(&db)
        .order_by("id")
        .preload("Tags")
        .all()
        .await
        .expect("posts");

    let tag_ids = |p: &Post| {
        let mut ids: Vec<i64> = p.tags.iter().map(|t| t.id).collect();
        ids.sort();
        ids
    };
    assert_eq!(tag_ids(&posts[0]), [10, 20]);
    assert_eq!(tag_ids(&posts[1]), [20]);

    let logs = logged(&buffer);
    assert_eq!(statements(&logs, "join_table", "post_tags"), 1);
    assert_eq!(statements(&logs, "select", "tags"), 1);
}

#[tokio::test]
async fn preloads_run_in_request_order() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    seed_post(&db, alice.id, "a1").await;

    let (buffer, _guard) = capture_logs();
    let users = User::find(&db)
        .preload("Profile")
        .preload("Posts")
        .all()
        .await
        .expect("users");
    assert_eq!(users[0].posts.len(), 1);

    let logs = logged(&buffer);
    let profiles_at = logs.find("table=\"profiles\"").expect("profiles query");
    let posts_at = logs.find("table=\"posts\"").expect("posts query");
    assert!(profiles_at < posts_at);
}

#[tokio::test]
async fn empty_result_runs_no_preload_queries() {
    let db = setup_db(&POSTGRES).await;

    let (buffer, _guard) = capture_logs();
    let users = User::find(&db)
        .preload("Posts")
        .preload("Profile")
        .all()
        .await
        .expect("users");
    assert!(users.is_empty());

    let logs = logged(&buffer);
    assert_eq!(statements(&logs, "select", "posts"), 0);
    assert_eq!(statements(&logs, "select", "profiles"), 0);
}

#[tokio::test]
async fn unknown_preload_fails_before_any_statement() {
    let db = setup_db(&POSTGRES).await;
    seed_user(&db, "alice").await;

    let (buffer, _guard) = capture_logs();
    let err = User::find(&db)
        .preload("Friends")
        .all()
        .await
        .expect_err("unknown");
    assert!(matches!(err, OrmError::UnknownRelation(ref name) if name == "Friends"));
    assert_eq!(statements(&logged(&buffer), "select", "users"), 0);
}

#[tokio::test]
async fn preload_scope_matches_builder_call() {
    let db = setup_db(&POSTGRES).await;
    let alice = seed_user(&db, "alice").await;
    seed_post(&db, alice.id, "a1").await;

    let users = User::find(&db)
        .scopes([&Scope::preload("Posts")])
        .all()
        .await
        .expect("users");
    assert_eq!(users[0].posts.len(), 1);
}
