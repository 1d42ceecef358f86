//! Follow graph operations.

use std::sync::Arc;

use serde_json::json;
use services::RelationshipService;

use crate::dispatcher::{Dispatcher, Reply, RequestContext};
use crate::error::ApiError;

pub const ADD_FOLLOW: &str = "addFollow";
pub const REMOVE_FOLLOW: &str = "removeFollow";
pub const GET_FOLLOWERS: &str = "getFollowers";
pub const GET_FOLLOWING: &str = "getFollowing";
pub const CHECK_FOLLOW_STATUS: &str = "checkFollowStatus";
pub const BATCH_CHECK_STATUS: &str = "batchCheckStatus";

const PAIR_REQUIRED: &str = "followerId and followeeId are required.";
const USER_REQUIRED: &str = "userId is required.";

pub fn routes(dispatcher: Dispatcher, relationships: Arc<RelationshipService>) -> Dispatcher {
    dispatcher
        .route(ADD_FOLLOW, relationships.clone(), add_follow)
        .route(REMOVE_FOLLOW, relationships.clone(), remove_follow)
        .route(GET_FOLLOWERS, relationships.clone(), get_followers)
        .route(GET_FOLLOWING, relationships.clone(), get_following)
        .route(CHECK_FOLLOW_STATUS, relationships.clone(), check_follow_status)
        .route(BATCH_CHECK_STATUS, relationships, batch_check_status)
}

async fn add_follow(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [follower, followee] = ctx.required(["followerId", "followeeId"], PAIR_REQUIRED)?;
    ctx.ensure_actor(follower)?;
    let counts = svc.add_follow(follower, followee).await?;
    Reply::with_data("Follow added successfully", counts)
}

async fn remove_follow(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [follower, followee] = ctx.required(["followerId", "followeeId"], PAIR_REQUIRED)?;
    ctx.ensure_actor(follower)?;
    if svc.remove_follow(follower, followee).await? {
        Ok(Reply::message("Unfollowed successfully"))
    } else {
        Ok(Reply::message("Not following this user"))
    }
}

async fn get_followers(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user] = ctx.required(["userId"], USER_REQUIRED)?;
    let followers = svc.followers(user).await?;
    Reply::with_data("Followers retrieved successfully.", followers)
}

async fn get_following(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user] = ctx.required(["userId"], USER_REQUIRED)?;
    let following = svc.following(user).await?;
    Reply::with_data("Following retrieved successfully.", following)
}

/// Missing ids are not an error here; the status degrades to unknown.
async fn check_follow_status(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let status = svc
        .follow_status(ctx.str_field("followerId"), ctx.str_field("followeeId"))
        .await;
    Reply::with_data("Follow status checked successfully.", status)
}

async fn batch_check_status(svc: Arc<RelationshipService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    const REQUIRED: &str = "userEmail and followeeIDs are required.";
    let [user] = ctx.required(["userEmail"], REQUIRED)?;
    let candidates = ctx
        .string_list("followeeIDs")
        .ok_or_else(|| ApiError::bad_request(REQUIRED))?;
    let statuses = svc.batch_follow_status(user, &candidates).await;
    Reply::with_data("Batch status check successful.", json!({ "followStatuses": statuses }))
}
