pub mod commissions;
pub mod health;
pub mod members;
pub mod purchases;
pub mod settlement;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::{PvPropagator, SettlementRunner};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub propagator: Arc<PvPropagator>,
    pub settlement: Arc<SettlementRunner>,
}

impl AppState {
    /// Wire the propagator and settlement runner from `config`.
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        let propagator = Arc::new(
            PvPropagator::new(repo.clone(), config.max_propagation_depth)
                .with_max_pv(config.max_purchase_pv),
        );
        let settlement = Arc::new(SettlementRunner::new(
            repo.clone(),
            config.settlement_rules(),
            config.settlement_schedule.offset,
        ));
        Self {
            repo,
            config,
            propagator,
            settlement,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/members", post(members::create_member))
        .route("/v1/members/:user_id", get(members::get_member))
        .route(
            "/v1/members/:user_id/affiliates",
            put(members::set_affiliates),
        )
        .route("/v1/purchases", post(purchases::record_purchase))
        .route(
            "/v1/admin/settlement/run",
            post(settlement::run_settlement),
        )
        .route(
            "/v1/admin/settlement/runs",
            get(settlement::list_runs),
        )
        .route("/v1/commissions", get(commissions::get_commissions))
        .layer(cors)
        .with_state(state)
}
