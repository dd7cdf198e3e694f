use crate::error::AppResult;
use crate::services::reports::{
    self, CareerReport, CourseReport, IndividualReport, SectionLevels, SectionProgress,
};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use crate::web::validation::required;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct GroupFilter {
    pub career: Option<String>,
    pub course: Option<String>,
    pub section_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct SectionFilter {
    pub section_id: Option<Uuid>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/individual", get(own_report))
        .route("/individual/:user_id", get(user_report))
        .route("/group/career", get(career_report))
        .route("/group/course", get(course_report))
        .route("/progress", get(progress_panel))
        .route("/levels-distribution", get(levels_distribution))
        .with_state(state)
}

async fn own_report(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<IndividualReport>> {
    Ok(Json(reports::individual(&state.pool, user.id).await?))
}

async fn user_report(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<IndividualReport>> {
    user.require_admin()?;
    Ok(Json(reports::individual(&state.pool, user_id).await?))
}

async fn career_report(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<GroupFilter>,
) -> AppResult<Json<CareerReport>> {
    user.require_admin()?;
    let career = required("career", filter.career.as_deref())?;
    Ok(Json(
        reports::by_career(&state.pool, career, filter.section_id).await?,
    ))
}

async fn course_report(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<GroupFilter>,
) -> AppResult<Json<CourseReport>> {
    user.require_admin()?;
    let career = required("career", filter.career.as_deref())?;
    let course = required("course", filter.course.as_deref())?;
    Ok(Json(
        reports::by_course(&state.pool, career, course, filter.section_id).await?,
    ))
}

async fn progress_panel(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<SectionFilter>,
) -> AppResult<Json<Vec<SectionProgress>>> {
    user.require_admin()?;
    Ok(Json(reports::progress(&state.pool, filter.section_id).await?))
}

async fn levels_distribution(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<SectionLevels>>> {
    user.require_admin()?;
    Ok(Json(reports::levels_by_section(&state.pool).await?))
}
