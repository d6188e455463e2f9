use salvo::affix_state;
use salvo::prelude::*;

use crate::web::AppState;
use crate::web::handlers::{
    auth, budget, family, goals, notifications, ops, planning, reference, reports, settings,
    transactions, users,
};
use crate::web::metrics::metrics_endpoint;
use crate::web::middleware::{log_requests, require_auth};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .hoop(log_requests)
        .hoop(affix_state::inject(state))
        .push(Router::with_path("health").get(ops::health_check))
        .push(Router::with_path("metrics").get(metrics_endpoint))
        .push(Router::with_path("status").get(ops::get_status))
        .push(
            Router::with_path("api")
                .push(Router::with_path("auth/register").post(auth::register))
                .push(Router::with_path("auth/login").post(auth::login))
                .push(Router::with_path("translations/{lang}").get(reference::get_translations))
                .push(private_routes()),
        )
}

fn private_routes() -> Router {
    Router::new()
        .hoop(require_auth)
        .push(Router::with_path("auth/logout").post(auth::logout))
        .push(Router::with_path("auth/me").get(auth::me))
        .push(
            Router::with_path("users/me")
                .put(users::update_me)
                .delete(users::delete_me),
        )
        .push(
            Router::with_path("settings")
                .get(settings::get_settings)
                .put(settings::update_settings),
        )
        .push(
            Router::with_path("transactions")
                .get(transactions::list_transactions)
                .post(transactions::create_transaction)
                .push(Router::with_path("categories").get(transactions::list_categories))
                .push(
                    Router::with_path("{id}")
                        .get(transactions::get_transaction)
                        .put(transactions::update_transaction)
                        .delete(transactions::delete_transaction),
                ),
        )
        .push(
            Router::with_path("budget")
                .get(budget::overview)
                .push(Router::with_path("history").get(budget::history))
                .push(
                    Router::with_path("{category}")
                        .put(budget::set_limit)
                        .delete(budget::delete_limit),
                ),
        )
        .push(
            Router::with_path("goals")
                .get(goals::list_goals)
                .post(goals::create_goal)
                .push(
                    Router::with_path("{id}")
                        .get(goals::get_goal)
                        .put(goals::update_goal)
                        .delete(goals::delete_goal)
                        .push(
                            Router::with_path("transactions")
                                .get(goals::list_entries)
                                .post(goals::add_entry),
                        ),
                ),
        )
        .push(
            Router::with_path("family")
                .get(family::get_family)
                .post(family::create_family)
                .delete(family::delete_family)
                .push(Router::with_path("transactions").get(family::family_transactions))
                .push(Router::with_path("members").post(family::add_member))
                .push(Router::with_path("members/{user_id}").delete(family::remove_member)),
        )
        .push(
            Router::with_path("reports")
                .push(Router::with_path("summary").get(reports::summary))
                .push(Router::with_path("trend").get(reports::trend)),
        )
        .push(
            Router::with_path("notifications")
                .get(notifications::list_notifications)
                .push(Router::with_path("read-all").put(notifications::mark_all_read))
                .push(Router::with_path("{id}/read").put(notifications::mark_read))
                .push(Router::with_path("{id}").delete(notifications::delete_notification)),
        )
        .push(
            Router::with_path("push")
                .push(Router::with_path("subscribe").post(notifications::subscribe))
                .push(Router::with_path("unsubscribe").post(notifications::unsubscribe)),
        )
        .push(Router::with_path("translations/{lang}").put(reference::put_translations))
        .push(
            Router::with_path("rates")
                .get(reference::list_rates)
                .push(Router::with_path("refresh").post(reference::refresh_rates)),
        )
        .push(
            Router::with_path("simulations")
                .push(Router::with_path("loan").post(planning::simulate_loan))
                .push(Router::with_path("savings").post(planning::project_savings))
                .push(Router::with_path("inflation").post(planning::inflation_impact)),
        )
        .push(Router::with_path("planning/health").get(planning::health_report))
}
