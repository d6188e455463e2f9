use salvo::prelude::*;

use crate::planning::HealthReport;
use crate::simulation::{
    self, InflationImpact, InflationRequest, LoanRequest, LoanSchedule, SavingsProjection,
    SavingsRequest,
};
use crate::web::ApiError;
use crate::web::handlers::{context, parse_body, today};

#[handler]
pub async fn simulate_loan(req: &mut Request) -> Result<Json<LoanSchedule>, ApiError> {
    let request: LoanRequest = parse_body(req).await?;
    Ok(Json(simulation::simulate_loan(&request)?))
}

#[handler]
pub async fn project_savings(req: &mut Request) -> Result<Json<SavingsProjection>, ApiError> {
    let request: SavingsRequest = parse_body(req).await?;
    Ok(Json(simulation::project_savings(&request)?))
}

#[handler]
pub async fn inflation_impact(req: &mut Request) -> Result<Json<InflationImpact>, ApiError> {
    let request: InflationRequest = parse_body(req).await?;
    Ok(Json(simulation::inflation_impact(&request)?))
}

#[handler]
pub async fn health_report(depot: &mut Depot) -> Result<Json<HealthReport>, ApiError> {
    let (state, user) = context(depot)?;
    Ok(Json(state.health.report(&user.id, today()).await?))
}
