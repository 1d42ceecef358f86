//! Reactions, downloads, comments and content removal.

use std::sync::Arc;

use serde_json::json;
use services::{CommentService, ContentService, EngagementService, NewComment, Reaction};

use crate::dispatcher::{Dispatcher, Reply, RequestContext};
use crate::error::ApiError;

pub const UPDATE_MEME_REACTION: &str = "updateMemeReaction";
pub const GET_LIKE_STATUS: &str = "getLikeStatus";
pub const REMOVE_DOWNLOADED_MEME: &str = "removeDownloadedMeme";
pub const DELETE_MEME: &str = "deleteMeme";
pub const POST_COMMENT: &str = "postComment";
pub const REPLY_TO_COMMENT: &str = "replyToComment";
pub const UPDATE_COMMENT_REACTION: &str = "updateCommentReaction";
pub const GET_COMMENTS: &str = "getComments";
pub const DELETE_COMMENT: &str = "deleteComment";

pub fn routes(
    dispatcher: Dispatcher,
    engagement: Arc<EngagementService>,
    content: Arc<ContentService>,
    comments: Arc<CommentService>,
) -> Dispatcher {
    dispatcher
        .route(UPDATE_MEME_REACTION, engagement.clone(), update_meme_reaction)
        .route(GET_LIKE_STATUS, engagement.clone(), get_like_status)
        .route(REMOVE_DOWNLOADED_MEME, engagement, remove_downloaded_meme)
        .route(DELETE_MEME, content, delete_meme)
        .route(POST_COMMENT, comments.clone(), post_comment)
        .route(REPLY_TO_COMMENT, comments.clone(), reply_to_comment)
        .route(UPDATE_COMMENT_REACTION, comments.clone(), update_comment_reaction)
        .route(GET_COMMENTS, comments.clone(), get_comments)
        .route(DELETE_COMMENT, comments, delete_comment)
}

async fn update_meme_reaction(svc: Arc<EngagementService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content, user] = ctx.required(["memeID", "email"], "memeID and email are required.")?;
    ctx.ensure_actor(user)?;
    let reaction = Reaction {
        content_id: content.to_string(),
        user_email: user.to_string(),
        like: ctx.flag("incrementLikes"),
        double_like: ctx.flag("doubleLike"),
        download: ctx.flag("incrementDownloads"),
    };
    let outcome = svc.react(&reaction).await?;
    Reply::with_data("Meme reaction updated successfully.", outcome)
}

async fn get_like_status(svc: Arc<EngagementService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content, user] = ctx.required(["memeID", "userEmail"], "memeID and userEmail are required.")?;
    let status = svc.like_status(content, user).await?;
    Reply::with_data("Meme info and like status retrieved successfully.", status)
}

async fn remove_downloaded_meme(svc: Arc<EngagementService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user, content] = ctx.required(
        ["userEmail", "memeID"],
        "UserEmail and memeID are required for removing a downloaded meme.",
    )?;
    ctx.ensure_actor(user)?;
    let removed = svc.remove_download(user, content).await?;
    Reply::with_data("Downloaded meme removed successfully", json!({ "removed": removed }))
}

async fn delete_meme(svc: Arc<ContentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content, user] = ctx.required(
        ["memeID", "userEmail"],
        "MemeID and userEmail are required for deleting a meme.",
    )?;
    ctx.ensure_actor(user)?;
    svc.delete_content(content, user).await?;
    Ok(Reply::message("Meme deleted successfully"))
}

fn new_comment(ctx: &RequestContext, content: &str, email: &str, username: &str, text: &str) -> NewComment {
    NewComment {
        content_id: content.to_string(),
        email: email.to_string(),
        username: username.to_string(),
        text: text.to_string(),
        profile_pic: ctx.str_field("profilePic").map(str::to_string),
    }
}

async fn post_comment(svc: Arc<CommentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content, text, email, username] = ctx.required(
        ["memeID", "text", "email", "username"],
        "Missing required fields for posting a comment.",
    )?;
    ctx.ensure_actor(email)?;
    let new = new_comment(&ctx, content, email, username, text);
    let comment = svc.post(new, ctx.str_field("parentCommentID")).await?;
    Reply::with_data("Comment posted successfully.", json!({ "comment": comment }))
}

async fn reply_to_comment(svc: Arc<CommentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [parent, content, text, email, username] = ctx.required(
        ["parentCommentID", "memeID", "text", "email", "username"],
        "Missing required fields for replying to a comment.",
    )?;
    ctx.ensure_actor(email)?;
    let new = new_comment(&ctx, content, email, username, text);
    let reply = svc.post(new, Some(parent)).await?;
    Reply::with_data("Reply posted successfully.", json!({ "reply": reply }))
}

async fn update_comment_reaction(svc: Arc<CommentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content, comment] = ctx.required(["memeID", "commentID"], "memeID and commentID are required.")?;
    if let Some(user) = ctx.str_field("userEmail") {
        ctx.ensure_actor(user)?;
    }
    let counts = svc
        .react(content, comment, ctx.flag("incrementLikes"), ctx.flag("incrementDislikes"))
        .await?;
    Reply::with_data("Comment reaction updated successfully.", counts)
}

async fn get_comments(svc: Arc<CommentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [content] = ctx.required(["memeID"], "memeID is required.")?;
    let page = svc
        .list(content, ctx.count("limit"), ctx.str_field("lastEvaluatedKey"))
        .await?;
    Reply::with_data("Comments retrieved successfully.", page)
}

async fn delete_comment(svc: Arc<CommentService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [comment, content, email] = ctx.required(
        ["commentID", "memeID", "email"],
        "commentID, memeID and email are required.",
    )?;
    ctx.ensure_actor(email)?;
    svc.delete(content, comment, email).await?;
    Ok(Reply::message("Comment deleted successfully."))
}
