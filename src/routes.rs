// src/routes.rs
use actix_web::web;
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::allocation_handlers::{commit_stock_out, get_transactions, issue_stock, preview_allocation};
use crate::approval::check_approval;
use crate::auth::jwt_middleware;
use crate::auth_handlers::{get_audit_log, get_profile, get_roles, list_demo_users, open_session};
use crate::batch_handlers::{
    change_batch_status, create_batch, delete_batch, get_all_batches, get_batch, get_expiring_batches,
    get_low_stock_batches, update_batch,
};
use crate::costing::calculate_breakdown;
use crate::handlers::get_dashboard_stats;
use crate::import_export::{export_batches, export_transactions};
use crate::monitoring::{health_check, metrics_endpoint};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check and metrics (no auth)
        .service(
            web::scope("/health")
                .route("", web::get().to(health_check))
                .route("/metrics", web::get().to(metrics_endpoint)),
        )
        // Session endpoints (no authentication required)
        .service(
            web::scope("/auth")
                .route("/session", web::post().to(open_session))
                .route("/users", web::get().to(list_demo_users)),
        )
        .service(
            web::scope("/api/v1")
                .wrap(HttpAuthentication::bearer(jwt_middleware))
                .service(
                    web::scope("/auth")
                        .route("/profile", web::get().to(get_profile))
                        .route("/roles", web::get().to(get_roles)),
                )
                // literal paths before /{id}
                .service(
                    web::scope("/batches")
                        .route("", web::get().to(get_all_batches))
                        .route("", web::post().to(create_batch))
                        .route("/expiring", web::get().to(get_expiring_batches))
                        .route("/low-stock", web::get().to(get_low_stock_batches))
                        .route("/export", web::get().to(export_batches))
                        .route("/{id}", web::get().to(get_batch))
                        .route("/{id}", web::put().to(update_batch))
                        .route("/{id}", web::delete().to(delete_batch))
                        .route("/{id}/status", web::put().to(change_batch_status)),
                )
                .route("/allocations/preview", web::post().to(preview_allocation))
                .service(
                    web::scope("/stock-outs")
                        .route("", web::post().to(commit_stock_out))
                        .route("/issue", web::post().to(issue_stock)),
                )
                .service(
                    web::scope("/transactions")
                        .route("", web::get().to(get_transactions))
                        .route("/export", web::get().to(export_transactions)),
                )
                .route("/procurement/approval-check", web::post().to(check_approval))
                .route("/costing/breakdown", web::post().to(calculate_breakdown))
                .route("/dashboard/stats", web::get().to(get_dashboard_stats))
                .route("/audit", web::get().to(get_audit_log)),
        );
}
