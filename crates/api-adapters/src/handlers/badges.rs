//! Badge eligibility, awards and listings.

use std::sync::Arc;

use serde_json::json;
use services::validation::require_email;
use services::BadgeService;

use crate::dispatcher::{Dispatcher, Reply, RequestContext};
use crate::error::ApiError;

pub const CHECK_BADGE_ELIGIBILITY: &str = "checkBadgeEligibility";
pub const AWARD_BADGE: &str = "awardBadge";
pub const GET_USER_BADGES: &str = "getUserBadges";

pub fn routes(dispatcher: Dispatcher, badges: Arc<BadgeService>) -> Dispatcher {
    dispatcher
        .route(CHECK_BADGE_ELIGIBILITY, badges.clone(), check_badge_eligibility)
        .route(AWARD_BADGE, badges.clone(), award_badge)
        .route(GET_USER_BADGES, badges, get_user_badges)
}

async fn check_badge_eligibility(svc: Arc<BadgeService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user, action] = ctx.required(
        ["userEmail", "action"],
        "userEmail and action are required for checking badge eligibility.",
    )?;
    require_email(user)?;
    let eligible = svc.check_eligibility(user, action).await?;
    let message = if eligible.is_some() {
        "Eligible for badge."
    } else {
        "Not eligible for badge."
    };
    Reply::with_data(message, json!({ "badgeType": eligible }))
}

async fn award_badge(svc: Arc<BadgeService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user, badge_type] = ctx.required(
        ["userEmail", "badgeType"],
        "userEmail and badgeType are required for awarding badges.",
    )?;
    require_email(user)?;
    ctx.ensure_actor(user)?;
    let newly_awarded = svc.award(user, badge_type).await?;
    Reply::with_data(
        "Badge awarded successfully.",
        json!({ "badgeType": badge_type, "newlyAwarded": newly_awarded }),
    )
}

async fn get_user_badges(svc: Arc<BadgeService>, ctx: RequestContext) -> Result<Reply, ApiError> {
    let [user] = ctx.required(["userEmail"], "userEmail is required for getting user badges.")?;
    require_email(user)?;
    let badges = svc.held_badges(user).await?;
    Reply::with_data("User badges retrieved successfully.", json!({ "badges": badges }))
}
