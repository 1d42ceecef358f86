//! Follow edges, counters, and the follow read operations.

mod common;

use common::*;
use domains::FollowCounts;
use serde_json::json;

#[tokio::test]
async fn follow_then_unfollow_restores_counters() {
    let h = Harness::new();
    let before = (h.counts(ALICE).await, h.counts(BOB).await);

    let added = h.follow(ALICE, BOB, ALICE_TOKEN).await;
    assert_eq!(added.status_code, 200);
    assert_eq!(added.message(), "Follow added successfully");
    assert_eq!(added.data(), json!({ "followersCount": 1, "followingCount": 1 }));

    let removed = h.unfollow(ALICE, BOB, ALICE_TOKEN).await;
    assert_eq!(removed.status_code, 200);
    assert_eq!(removed.message(), "Unfollowed successfully");

    assert_eq!((h.counts(ALICE).await, h.counts(BOB).await), before);
}

#[tokio::test]
async fn self_follow_is_always_rejected() {
    let h = Harness::new();
    let resp = h.follow(ALICE, ALICE, ALICE_TOKEN).await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(resp.message(), "Users cannot follow themselves");
    assert_eq!(h.counts(ALICE).await, FollowCounts::default());
}

#[tokio::test]
async fn repeated_unfollow_never_goes_negative() {
    let h = Harness::new();
    h.follow(ALICE, BOB, ALICE_TOKEN).await;
    h.unfollow(ALICE, BOB, ALICE_TOKEN).await;

    for _ in 0..3 {
        let resp = h.unfollow(ALICE, BOB, ALICE_TOKEN).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.message(), "Not following this user");
    }
    assert_eq!(h.counts(ALICE).await, FollowCounts::default());
    assert_eq!(h.counts(BOB).await, FollowCounts::default());
}

#[tokio::test]
async fn repeated_follow_is_a_conflict_and_counts_once() {
    let h = Harness::new();
    h.follow(ALICE, BOB, ALICE_TOKEN).await;
    let again = h.follow(ALICE, BOB, ALICE_TOKEN).await;

    assert_eq!(again.status_code, 400);
    assert_eq!(again.message(), "Already following this user");
    assert_eq!(h.counts(BOB).await.followers_count, 1);
    assert_eq!(h.counts(ALICE).await.following_count, 1);
}

#[tokio::test]
async fn edge_is_visible_from_both_sides() {
    let h = Harness::new();
    h.follow(ALICE, BOB, ALICE_TOKEN).await;

    let following = h
        .call("follow", json!({ "operation": "getFollowing", "userId": ALICE }), None)
        .await;
    assert_eq!(following.message(), "Following retrieved successfully.");
    assert_eq!(following.data(), json!([BOB]));

    let followers = h
        .call("follow", json!({ "operation": "getFollowers", "userId": BOB }), None)
        .await;
    assert_eq!(followers.data(), json!([ALICE]));

    let status = h
        .call(
            "follow",
            json!({ "operation": "checkFollowStatus", "followerId": ALICE, "followeeId": BOB }),
            None,
        )
        .await;
    assert_eq!(status.message(), "Follow status checked successfully.");
    assert_eq!(status.data(), json!({ "isFollowing": true, "canFollow": true }));
}

#[tokio::test]
async fn follow_status_degrades_instead_of_failing() {
    let h = Harness::new();

    let missing = h
        .call("follow", json!({ "operation": "checkFollowStatus", "followerId": ALICE }), None)
        .await;
    assert_eq!(missing.status_code, 200);
    assert_eq!(missing.data(), json!({ "isFollowing": false, "canFollow": true }));

    let itself = h
        .call(
            "follow",
            json!({ "operation": "checkFollowStatus", "followerId": ALICE, "followeeId": ALICE }),
            None,
        )
        .await;
    assert_eq!(itself.data(), json!({ "isFollowing": false, "canFollow": false }));
}

#[tokio::test]
async fn batch_status_covers_every_candidate() {
    let h = Harness::new();
    h.follow(ALICE, BOB, ALICE_TOKEN).await;

    let resp = h
        .call(
            "follow",
            json!({ "operation": "batchCheckStatus", "userEmail": ALICE, "followeeIDs": [BOB, CAROL] }),
            None,
        )
        .await;
    assert_eq!(resp.message(), "Batch status check successful.");
    assert_eq!(resp.data(), json!({ "followStatuses": { "bob@x.com": true, "carol@x.com": false } }));

    let no_list = h
        .call("follow", json!({ "operation": "batchCheckStatus", "userEmail": ALICE }), None)
        .await;
    assert_eq!(no_list.status_code, 400);
    assert_eq!(no_list.message(), "userEmail and followeeIDs are required.");
}

#[tokio::test]
async fn missing_ids_are_rejected_with_field_names() {
    let h = Harness::new();
    let resp = h
        .call("follow", json!({ "operation": "addFollow", "followerId": ALICE }), Some(ALICE_TOKEN))
        .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(resp.message(), "followerId and followeeId are required.");

    let reads = h.call("follow", json!({ "operation": "getFollowers" }), None).await;
    assert_eq!(reads.message(), "userId is required.");
}

#[tokio::test]
async fn concurrent_follows_of_one_user_all_count() {
    let h = std::sync::Arc::new(Harness::new());
    let followers: Vec<String> = (0..16).map(|i| format!("fan{i}@x.com")).collect();

    let tasks: Vec<_> = followers
        .iter()
        .cloned()
        .map(|fan| {
            let h = h.clone();
            tokio::spawn(async move { h.services.relationships.add_follow(&fan, BOB).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.counts(BOB).await.followers_count, 16);
}
