//! Consolidated initial schema migration

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create users table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(uuid(User::Id).primary_key())
                    .col(string_len(User::Email, 255).unique_key())
                    .col(string_len(User::PasswordHash, 255))
                    .col(string_len_null(User::Name, 255))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create user_sessions table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(UserSession::Table)
                    .if_not_exists()
                    .col(uuid(UserSession::Id).primary_key())
                    .col(uuid(UserSession::UserId))
                    .col(string_len(UserSession::Token, 255).unique_key())
                    .col(timestamp_with_time_zone(UserSession::ExpiresAt))
                    .col(
                        timestamp_with_time_zone(UserSession::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_sessions_user_id")
                            .from(UserSession::Table, UserSession::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_sessions_user_id")
                    .table(UserSession::Table)
                    .col(UserSession::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. Create api_keys table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(ApiKey::Table)
                    .if_not_exists()
                    .col(uuid(ApiKey::Id).primary_key())
                    .col(uuid(ApiKey::UserId))
                    .col(string_len(ApiKey::Name, 255))
                    .col(string_len(ApiKey::KeyHash, 255).unique_key())
                    .col(string_len(ApiKey::KeyPrefix, 16))
                    .col(timestamp_with_time_zone_null(ApiKey::LastUsedAt))
                    .col(timestamp_with_time_zone_null(ApiKey::ExpiresAt))
                    .col(
                        timestamp_with_time_zone(ApiKey::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_keys_user_id")
                            .from(ApiKey::Table, ApiKey::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_api_keys_user_id")
                    .table(ApiKey::Table)
                    .col(ApiKey::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. Create endpoints table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Endpoint::Table)
                    .if_not_exists()
                    .col(uuid(Endpoint::Id).primary_key())
                    .col(string_len(Endpoint::Slug, 128).unique_key())
                    .col(string_len_null(Endpoint::Name, 255))
                    .col(
                        timestamp_with_time_zone(Endpoint::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_endpoints_slug")
                    .table(Endpoint::Table)
                    .col(Endpoint::Slug)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 5. Create requests table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Request::Table)
                    .if_not_exists()
                    .col(uuid(Request::Id).primary_key())
                    .col(uuid(Request::EndpointId))
                    .col(string_len(Request::Method, 16))
                    .col(text_null(Request::Path))
                    .col(json_binary(Request::Headers))
                    .col(json_binary(Request::QueryParams))
                    .col(string_len_null(Request::Ip, 64))
                    .col(text_null(Request::Body))
                    .col(big_integer(Request::BodySize))
                    .col(string_len_null(Request::ContentType, 255))
                    .col(
                        timestamp_with_time_zone(Request::ReceivedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_requests_endpoint_id")
                            .from(Request::Table, Request::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_requests_endpoint_id_received_at")
                    .table(Request::Table)
                    .col(Request::EndpointId)
                    .col(Request::ReceivedAt)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 6. Create endpoint_settings table (1:1 with endpoints)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(EndpointSettings::Table)
                    .if_not_exists()
                    .col(uuid(EndpointSettings::EndpointId).primary_key())
                    .col(string_len_null(EndpointSettings::HmacSecret, 255))
                    .col(
                        string_len(EndpointSettings::HmacAlgorithm, 16)
                            .default("sha256"),
                    )
                    .col(integer_null(EndpointSettings::RateLimitPerMinute))
                    .col(integer_null(EndpointSettings::RateLimitPerHour))
                    .col(integer_null(EndpointSettings::RateLimitPerDay))
                    .col(
                        timestamp_with_time_zone(EndpointSettings::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_endpoint_settings_endpoint_id")
                            .from(EndpointSettings::Table, EndpointSettings::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 7. Create forwarding_rules table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(ForwardingRule::Table)
                    .if_not_exists()
                    .col(uuid(ForwardingRule::Id).primary_key())
                    .col(uuid(ForwardingRule::EndpointId))
                    .col(text(ForwardingRule::TargetUrl))
                    .col(string_len_null(ForwardingRule::Method, 16))
                    .col(json_binary(ForwardingRule::Headers))
                    .col(boolean(ForwardingRule::Enabled).default(true))
                    .col(integer(ForwardingRule::MaxRetries).default(3))
                    .col(json_binary(ForwardingRule::BackoffConfig))
                    .col(string_len_null(ForwardingRule::ConditionType, 32))
                    .col(json_binary_null(ForwardingRule::ConditionConfig))
                    .col(
                        timestamp_with_time_zone(ForwardingRule::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(ForwardingRule::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forwarding_rules_endpoint_id")
                            .from(ForwardingRule::Table, ForwardingRule::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_forwarding_rules_endpoint_id")
                    .table(ForwardingRule::Table)
                    .col(ForwardingRule::EndpointId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 8. Create forward_attempts table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(ForwardAttempt::Table)
                    .if_not_exists()
                    .col(uuid(ForwardAttempt::Id).primary_key())
                    .col(uuid(ForwardAttempt::RequestId))
                    .col(uuid(ForwardAttempt::ForwardingRuleId))
                    .col(integer(ForwardAttempt::AttemptNumber))
                    .col(string_len(ForwardAttempt::Status, 16))
                    .col(integer_null(ForwardAttempt::ResponseStatus))
                    .col(json_binary_null(ForwardAttempt::ResponseHeaders))
                    .col(text_null(ForwardAttempt::ResponseBody))
                    .col(text_null(ForwardAttempt::ErrorMessage))
                    .col(integer_null(ForwardAttempt::DurationMs))
                    .col(
                        timestamp_with_time_zone(ForwardAttempt::AttemptedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forward_attempts_request_id")
                            .from(ForwardAttempt::Table, ForwardAttempt::RequestId)
                            .to(Request::Table, Request::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forward_attempts_forwarding_rule_id")
                            .from(ForwardAttempt::Table, ForwardAttempt::ForwardingRuleId)
                            .to(ForwardingRule::Table, ForwardingRule::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_forward_attempts_request_id")
                    .table(ForwardAttempt::Table)
                    .col(ForwardAttempt::RequestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_forward_attempts_rule_id_attempted_at")
                    .table(ForwardAttempt::Table)
                    .col(ForwardAttempt::ForwardingRuleId)
                    .col(ForwardAttempt::AttemptedAt)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 9. Create replays table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Replay::Table)
                    .if_not_exists()
                    .col(uuid(Replay::Id).primary_key())
                    .col(uuid(Replay::RequestId))
                    .col(text(Replay::TargetUrl))
                    .col(string_len(Replay::Method, 16))
                    .col(json_binary(Replay::Headers))
                    .col(text_null(Replay::Body))
                    .col(integer(Replay::Attempts).default(0))
                    .col(string_len(Replay::Status, 16).default("pending"))
                    .col(integer_null(Replay::ResponseStatus))
                    .col(json_binary_null(Replay::ResponseHeaders))
                    .col(text_null(Replay::ResponseBody))
                    .col(text_null(Replay::ErrorMessage))
                    .col(timestamp_with_time_zone_null(Replay::LastAttemptAt))
                    .col(
                        timestamp_with_time_zone(Replay::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_replays_request_id")
                            .from(Replay::Table, Replay::RequestId)
                            .to(Request::Table, Request::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_replays_request_id")
                    .table(Replay::Table)
                    .col(Replay::RequestId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 10. Create transformations table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Transformation::Table)
                    .if_not_exists()
                    .col(uuid(Transformation::Id).primary_key())
                    .col(uuid(Transformation::EndpointId))
                    .col(string_len(Transformation::Name, 255))
                    .col(string_len(Transformation::Dialect, 32))
                    .col(text(Transformation::Script))
                    .col(string_len(Transformation::ApplyTo, 16))
                    .col(boolean(Transformation::Enabled).default(true))
                    .col(
                        timestamp_with_time_zone(Transformation::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Transformation::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transformations_endpoint_id")
                            .from(Transformation::Table, Transformation::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transformations_endpoint_id")
                    .table(Transformation::Table)
                    .col(Transformation::EndpointId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 11. Create retention_policies table (1:1 with endpoints)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(RetentionPolicy::Table)
                    .if_not_exists()
                    .col(uuid(RetentionPolicy::EndpointId).primary_key())
                    .col(integer(RetentionPolicy::RetentionDays).default(30))
                    .col(boolean(RetentionPolicy::AutoDelete).default(false))
                    .col(boolean(RetentionPolicy::ArchiveEnabled).default(false))
                    .col(text_null(RetentionPolicy::ArchivePath))
                    .col(
                        timestamp_with_time_zone(RetentionPolicy::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(RetentionPolicy::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_retention_policies_endpoint_id")
                            .from(RetentionPolicy::Table, RetentionPolicy::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 12. Create request_templates table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(RequestTemplate::Table)
                    .if_not_exists()
                    .col(uuid(RequestTemplate::Id).primary_key())
                    .col(uuid(RequestTemplate::EndpointId))
                    .col(string_len(RequestTemplate::Name, 255))
                    .col(string_len(RequestTemplate::Method, 16))
                    .col(text(RequestTemplate::Url))
                    .col(json_binary(RequestTemplate::Headers))
                    .col(text_null(RequestTemplate::Body))
                    .col(text_null(RequestTemplate::Description))
                    .col(
                        timestamp_with_time_zone(RequestTemplate::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(RequestTemplate::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_request_templates_endpoint_id")
                            .from(RequestTemplate::Table, RequestTemplate::EndpointId)
                            .to(Endpoint::Table, Endpoint::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 13. Hourly per-rule delivery aggregation
        // ============================================================
        let stats_view = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                "CREATE MATERIALIZED VIEW IF NOT EXISTS rule_delivery_stats_hourly AS \
                 SELECT forwarding_rule_id, \
                        date_trunc('hour', attempted_at) AS bucket, \
                        count(*) AS attempts, \
                        count(*) FILTER (WHERE status = 'success') AS successes, \
                        count(*) FILTER (WHERE status = 'failed') AS failures, \
                        avg(duration_ms) AS avg_duration_ms \
                 FROM forward_attempts \
                 GROUP BY forwarding_rule_id, date_trunc('hour', attempted_at)"
            }
            _ => {
                "CREATE VIEW IF NOT EXISTS rule_delivery_stats_hourly AS \
                 SELECT forwarding_rule_id, \
                        strftime('%Y-%m-%d %H:00:00', attempted_at) AS bucket, \
                        count(*) AS attempts, \
                        sum(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS successes, \
                        sum(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failures, \
                        avg(duration_ms) AS avg_duration_ms \
                 FROM forward_attempts \
                 GROUP BY forwarding_rule_id, strftime('%Y-%m-%d %H:00:00', attempted_at)"
            }
        };
        manager.get_connection().execute_unprepared(stats_view).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let drop_view = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                "DROP MATERIALIZED VIEW IF EXISTS rule_delivery_stats_hourly"
            }
            _ => "DROP VIEW IF EXISTS rule_delivery_stats_hourly",
        };
        manager.get_connection().execute_unprepared(drop_view).await?;

        manager
            .drop_table(Table::drop().table(RequestTemplate::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RetentionPolicy::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transformation::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Replay::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ForwardAttempt::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ForwardingRule::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EndpointSettings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Request::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Endpoint::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApiKey::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserSession::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Email,
    PasswordHash,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserSession {
    #[sea_orm(iden = "user_sessions")]
    Table,
    Id,
    UserId,
    Token,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ApiKey {
    #[sea_orm(iden = "api_keys")]
    Table,
    Id,
    UserId,
    Name,
    KeyHash,
    KeyPrefix,
    LastUsedAt,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Endpoint {
    #[sea_orm(iden = "endpoints")]
    Table,
    Id,
    Slug,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Request {
    #[sea_orm(iden = "requests")]
    Table,
    Id,
    EndpointId,
    Method,
    Path,
    Headers,
    QueryParams,
    Ip,
    Body,
    BodySize,
    ContentType,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum EndpointSettings {
    #[sea_orm(iden = "endpoint_settings")]
    Table,
    EndpointId,
    HmacSecret,
    HmacAlgorithm,
    RateLimitPerMinute,
    RateLimitPerHour,
    RateLimitPerDay,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ForwardingRule {
    #[sea_orm(iden = "forwarding_rules")]
    Table,
    Id,
    EndpointId,
    TargetUrl,
    Method,
    Headers,
    Enabled,
    MaxRetries,
    BackoffConfig,
    ConditionType,
    ConditionConfig,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ForwardAttempt {
    #[sea_orm(iden = "forward_attempts")]
    Table,
    Id,
    RequestId,
    ForwardingRuleId,
    AttemptNumber,
    Status,
    ResponseStatus,
    ResponseHeaders,
    ResponseBody,
    ErrorMessage,
    DurationMs,
    AttemptedAt,
}

#[derive(DeriveIden)]
enum Replay {
    #[sea_orm(iden = "replays")]
    Table,
    Id,
    RequestId,
    TargetUrl,
    Method,
    Headers,
    Body,
    Attempts,
    Status,
    ResponseStatus,
    ResponseHeaders,
    ResponseBody,
    ErrorMessage,
    LastAttemptAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Transformation {
    #[sea_orm(iden = "transformations")]
    Table,
    Id,
    EndpointId,
    Name,
    Dialect,
    Script,
    ApplyTo,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RetentionPolicy {
    #[sea_orm(iden = "retention_policies")]
    Table,
    EndpointId,
    RetentionDays,
    AutoDelete,
    ArchiveEnabled,
    ArchivePath,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RequestTemplate {
    #[sea_orm(iden = "request_templates")]
    Table,
    Id,
    EndpointId,
    Name,
    Method,
    Url,
    Headers,
    Body,
    Description,
    CreatedAt,
    UpdatedAt,
}
