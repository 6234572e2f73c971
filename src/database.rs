#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[cfg(feature = "database")]
mod sqlite {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde::de::DeserializeOwned;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
    use sqlx::{migrate::MigrateDatabase, QueryBuilder, Row, Sqlite};
    use std::collections::BTreeMap;
    use std::str::FromStr;
    use tracing::info;

    use crate::config::DatabaseConfig;
    use crate::error::{ConflictKind, PlannerError, PlannerResult, StoreError};
    use crate::model::{
        AppApproval, AppStatus, Attachment, AuditLogEntry, BacApproval, EndUser, EndUserType,
        NewAuditEntry, NewNotification, NewPpmp, NewPurchaseRequest, NewPurchaseRequestItem,
        NewRowRemark, NewUser, Notification, Office, OfficeId, Ppmp, PpmpId, PpmpRow,
        PurchaseRequest, PurchaseRequestItem, RowFields, RowId, RowRemark, School, SchoolId,
        StatusUpdate, User, UserId,
    };
    use crate::store::{
        Page, PageResult, PpmpFilter, PurchaseRequestFilter, RecordStore, RowFilter, UserFilter,
    };

    /// Record store over the relational schema in `migrations/`.
    ///
    /// Lots, attachments and header remarks live in JSON text columns.
    #[derive(Debug, Clone)]
    pub struct SqliteStore {
        pool: SqlitePool,
    }

    enum Violation {
        Unique,
        ForeignKey,
    }

    fn violation(err: &sqlx::Error) -> Option<Violation> {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Some(Violation::Unique),
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => Some(Violation::ForeignKey),
            _ => None,
        }
    }

    fn corrupt(table: &'static str, reason: impl ToString) -> PlannerError {
        PlannerError::from(StoreError::Corrupt {
            table,
            reason: reason.to_string(),
        })
    }

    fn parse_column<T: FromStr<Err = PlannerError>>(table: &'static str, value: &str) -> PlannerResult<T> {
        value.parse().map_err(|e: PlannerError| corrupt(table, e))
    }

    fn json_column<T: DeserializeOwned>(table: &'static str, raw: &str) -> PlannerResult<T> {
        serde_json::from_str(raw).map_err(|e| corrupt(table, e))
    }

    fn paginate<T: Clone>(items: Vec<T>, page: Page) -> PageResult<T> {
        PageResult {
            total: items.len(),
            items: page.slice(&items),
        }
    }

    fn school_from(row: &SqliteRow) -> PlannerResult<School> {
        Ok(School {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            head_user_id: row.try_get("head_user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn office_from(row: &SqliteRow) -> PlannerResult<Office> {
        Ok(Office {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            head_user_id: row.try_get("head_user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn user_from(row: &SqliteRow) -> PlannerResult<User> {
        let user_type: String = row.try_get("type")?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            user_type: parse_column("users", &user_type)?,
            designation: row.try_get("designation")?,
            school_id: row.try_get("school_id")?,
            office_id: row.try_get("office_id")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn ppmp_from(row: &SqliteRow) -> PlannerResult<Ppmp> {
        let end_user_type: String = row.try_get("end_user_type")?;
        let end_user = EndUser::from_columns(
            parse_column::<EndUserType>("ppmps", &end_user_type)?,
            row.try_get("school_id")?,
            row.try_get("office_id")?,
        )
        .map_err(|e| corrupt("ppmps", e))?;
        let status: String = row.try_get("status")?;
        let remarks: String = row.try_get("remarks")?;
        Ok(Ppmp {
            id: row.try_get("id")?,
            fiscal_year: row.try_get("fiscal_year")?,
            end_user,
            created_by: row.try_get("created_by")?,
            status: parse_column("ppmps", &status)?,
            remarks: json_column("ppmps", &remarks)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn ppmp_row_from(row: &SqliteRow) -> PlannerResult<PpmpRow> {
        let project_type: String = row.try_get("project_type")?;
        let procurement_mode: Option<String> = row.try_get("procurement_mode")?;
        let items: String = row.try_get("items")?;
        let attachments: String = row.try_get("attachments")?;
        let remarks: String = row.try_get("remarks")?;
        let app_status: String = row.try_get("app_status")?;
        Ok(PpmpRow {
            id: row.try_get("id")?,
            ppmp_id: row.try_get("ppmp_id")?,
            general_description: row.try_get("general_description")?,
            project_type: parse_column("ppmp_rows", &project_type)?,
            items: json_column("ppmp_rows", &items)?,
            procurement_mode: procurement_mode
                .as_deref()
                .map(|mode| parse_column("ppmp_rows", mode))
                .transpose()?,
            pre_procurement_conference: row.try_get("pre_procurement_conference")?,
            procurement_start_date: row.try_get("procurement_start_date")?,
            procurement_end_date: row.try_get("procurement_end_date")?,
            delivery_period: row.try_get("delivery_period")?,
            source_of_funds: row.try_get("source_of_funds")?,
            estimated_budget: row.try_get("estimated_budget")?,
            attachments: json_column("ppmp_rows", &attachments)?,
            remarks: json_column("ppmp_rows", &remarks)?,
            app_status: parse_column("ppmp_rows", &app_status)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_remark_from(row: &SqliteRow) -> PlannerResult<RowRemark> {
        Ok(RowRemark {
            id: row.try_get("id")?,
            ppmp_row_id: row.try_get("ppmp_row_id")?,
            text: row.try_get("text")?,
            role: row.try_get("role")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn bac_approval_from(row: &SqliteRow) -> PlannerResult<BacApproval> {
        Ok(BacApproval {
            id: row.try_get("id")?,
            ppmp_id: row.try_get("ppmp_id")?,
            user_id: row.try_get("user_id")?,
            approved_at: row.try_get("approved_at")?,
        })
    }

    fn audit_entry_from(row: &SqliteRow) -> PlannerResult<AuditLogEntry> {
        let from_status: String = row.try_get("from_status")?;
        let to_status: String = row.try_get("to_status")?;
        Ok(AuditLogEntry {
            id: row.try_get("id")?,
            ppmp_id: row.try_get("ppmp_id")?,
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            from_status: parse_column("ppmp_audit_log", &from_status)?,
            to_status: parse_column("ppmp_audit_log", &to_status)?,
            remarks: row.try_get("remarks")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn app_approval_from(row: &SqliteRow) -> PlannerResult<AppApproval> {
        Ok(AppApproval {
            fiscal_year: row.try_get("fiscal_year")?,
            approved_at: row.try_get("approved_at")?,
            approved_by_user_id: row.try_get("approved_by_user_id")?,
        })
    }

    fn purchase_request_from(row: &SqliteRow) -> PlannerResult<PurchaseRequest> {
        let status: String = row.try_get("status")?;
        Ok(PurchaseRequest {
            id: row.try_get("id")?,
            ppmp_row_id: row.try_get("ppmp_row_id")?,
            created_by: row.try_get("created_by")?,
            status: parse_column("purchase_requests", &status)?,
            reference_number: row.try_get("reference_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn purchase_request_item_from(row: &SqliteRow) -> PlannerResult<PurchaseRequestItem> {
        let lot_index: i64 = row.try_get("lot_index")?;
        let item_index: i64 = row.try_get("item_index")?;
        Ok(PurchaseRequestItem {
            id: row.try_get("id")?,
            purchase_request_id: row.try_get("purchase_request_id")?,
            ppmp_row_id: row.try_get("ppmp_row_id")?,
            lot_index: usize::try_from(lot_index).map_err(|e| corrupt("purchase_request_items", e))?,
            item_index: usize::try_from(item_index).map_err(|e| corrupt("purchase_request_items", e))?,
            description: row.try_get("description")?,
            quantity: row.try_get("quantity")?,
            unit: row.try_get("unit")?,
            estimated_cost: row.try_get("estimated_cost")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn notification_from(row: &SqliteRow) -> PlannerResult<Notification> {
        let kind: String = row.try_get("type")?;
        Ok(Notification {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            kind: parse_column("notifications", &kind)?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            link: row.try_get("link")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    impl SqliteStore {
        /// Open the database with automatic migrations
        pub async fn connect(settings: &DatabaseConfig) -> PlannerResult<Self> {
            // Create database if it doesn't exist
            if !settings.url.contains(":memory:")
                && !Sqlite::database_exists(&settings.url).await?
            {
                info!("Creating database at {}", settings.url);
                Sqlite::create_database(&settings.url).await?;
            }

            let pool = SqlitePoolOptions::new()
                .max_connections(settings.max_connections.max(1))
                .connect(&settings.url)
                .await?;

            if settings.auto_migrate {
                info!("Running database migrations...");
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                info!("Database migrations completed");
            }

            Ok(Self { pool })
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }

        /// Close database connections gracefully
        pub async fn shutdown(&self) {
            info!("Shutting down database connections...");
            self.pool.close().await;
            info!("Database connections closed");
        }

        async fn end_user_name(&self, end_user: &EndUser) -> PlannerResult<Option<String>> {
            let sql = match end_user {
                EndUser::School(_) => "SELECT name FROM schools WHERE id = ?1",
                EndUser::Office(_) => "SELECT name FROM offices WHERE id = ?1",
            };
            let id = end_user.school_id().or(end_user.office_id());
            let row = sqlx::query(sql).bind(id).fetch_optional(&self.pool).await?;
            row.map(|r| r.try_get::<String, _>("name").map_err(PlannerError::from))
                .transpose()
        }

        async fn ppmps_where(&self, fiscal_year: Option<i32>) -> PlannerResult<Vec<Ppmp>> {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM ppmps");
            if let Some(fy) = fiscal_year {
                query.push(" WHERE fiscal_year = ").push_bind(fy);
            }
            query.push(" ORDER BY id DESC");
            let rows = query.build().fetch_all(&self.pool).await?;
            rows.iter().map(ppmp_from).collect()
        }

        async fn set_head(
            &self,
            table: &'static str,
            id: i64,
            head_user_id: Option<UserId>,
        ) -> PlannerResult<SqliteRow> {
            let sql = format!(
                "UPDATE {table} SET head_user_id = ?1, updated_at = ?2 WHERE id = ?3 RETURNING *"
            );
            let result = sqlx::query(&sql)
                .bind(head_user_id)
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
            match result {
                Ok(Some(row)) => Ok(row),
                Ok(None) => Err(PlannerError::not_found(if table == "schools" { "school" } else { "office" }, id)),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("user", head_user_id.unwrap_or_default()))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn delete_by_id(&self, table: &'static str, entity: &'static str, id: i64) -> PlannerResult<()> {
            let sql = format!("DELETE FROM {table} WHERE id = ?1");
            match sqlx::query(&sql).bind(id).execute(&self.pool).await {
                Ok(done) if done.rows_affected() == 0 => Err(PlannerError::not_found(entity, id)),
                Ok(_) => Ok(()),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::Referential { entity, id })
                }
                Err(e) => Err(e.into()),
            }
        }
    }

    #[async_trait]
    impl RecordStore for SqliteStore {
        async fn insert_school(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<School> {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO schools (name, head_user_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                RETURNING *
                "#,
            )
            .bind(name)
            .bind(head_user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => school_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("user", head_user_id.unwrap_or_default()))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn get_school(&self, id: SchoolId) -> PlannerResult<Option<School>> {
            sqlx::query("SELECT * FROM schools WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(school_from)
                .transpose()
        }

        async fn list_schools(&self) -> PlannerResult<Vec<School>> {
            let rows = sqlx::query("SELECT * FROM schools ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(school_from).collect()
        }

        async fn set_school_head(&self, id: SchoolId, head_user_id: Option<UserId>) -> PlannerResult<School> {
            school_from(&self.set_head("schools", id, head_user_id).await?)
        }

        async fn delete_school(&self, id: SchoolId) -> PlannerResult<()> {
            self.delete_by_id("schools", "school", id).await
        }

        async fn insert_office(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<Office> {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO offices (name, head_user_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                RETURNING *
                "#,
            )
            .bind(name)
            .bind(head_user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => office_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("user", head_user_id.unwrap_or_default()))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn get_office(&self, id: OfficeId) -> PlannerResult<Option<Office>> {
            sqlx::query("SELECT * FROM offices WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(office_from)
                .transpose()
        }

        async fn list_offices(&self) -> PlannerResult<Vec<Office>> {
            let rows = sqlx::query("SELECT * FROM offices ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(office_from).collect()
        }

        async fn set_office_head(&self, id: OfficeId, head_user_id: Option<UserId>) -> PlannerResult<Office> {
            office_from(&self.set_head("offices", id, head_user_id).await?)
        }

        async fn delete_office(&self, id: OfficeId) -> PlannerResult<()> {
            self.delete_by_id("offices", "office", id).await
        }

        async fn insert_user(&self, user: NewUser) -> PlannerResult<User> {
            let email = user.email.trim().to_lowercase();
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO users (name, email, type, designation, school_id, office_id, is_active, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                RETURNING *
                "#,
            )
            .bind(&user.name)
            .bind(&email)
            .bind(user.user_type.as_str())
            .bind(&user.designation)
            .bind(user.school_id)
            .bind(user.office_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => user_from(&row),
                Err(e) => match violation(&e) {
                    Some(Violation::Unique) => Err(PlannerError::Conflict(ConflictKind::DuplicateEmail(email))),
                    Some(Violation::ForeignKey) => Err(PlannerError::not_found(
                        if user.school_id.is_some() { "school" } else { "office" },
                        user.school_id.or(user.office_id).unwrap_or_default(),
                    )),
                    None => Err(e.into()),
                },
            }
        }

        async fn get_user(&self, id: UserId) -> PlannerResult<Option<User>> {
            sqlx::query("SELECT * FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(user_from)
                .transpose()
        }

        async fn list_users(&self, filter: &UserFilter) -> PlannerResult<Vec<User>> {
            let rows = sqlx::query("SELECT * FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            let mut users = Vec::with_capacity(rows.len());
            for row in &rows {
                let user = user_from(row)?;
                if filter.matches(&user) {
                    users.push(user);
                }
            }
            Ok(users)
        }

        async fn set_user_active(&self, id: UserId, is_active: bool) -> PlannerResult<User> {
            let row = sqlx::query("UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3 RETURNING *")
                .bind(is_active)
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| PlannerError::not_found("user", id))?;
            user_from(&row)
        }

        async fn delete_user(&self, id: UserId) -> PlannerResult<()> {
            self.delete_by_id("users", "user", id).await
        }

        async fn insert_ppmp(&self, ppmp: NewPpmp) -> PlannerResult<Ppmp> {
            let end_user_name = self.end_user_name(&ppmp.end_user).await?.ok_or_else(|| {
                PlannerError::not_found(ppmp.end_user.kind().as_str(), ppmp.end_user)
            })?;
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO ppmps (fiscal_year, end_user_type, school_id, office_id, created_by, status, remarks, version, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 'draft', '[]', 0, ?6, ?6)
                RETURNING *
                "#,
            )
            .bind(ppmp.fiscal_year)
            .bind(ppmp.end_user.kind().as_str())
            .bind(ppmp.end_user.school_id())
            .bind(ppmp.end_user.office_id())
            .bind(ppmp.created_by)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => ppmp_from(&row),
                Err(e) => match violation(&e) {
                    Some(Violation::Unique) => Err(PlannerError::Conflict(ConflictKind::DuplicatePpmp {
                        fiscal_year: ppmp.fiscal_year,
                        end_user: end_user_name,
                    })),
                    Some(Violation::ForeignKey) => Err(PlannerError::not_found("user", ppmp.created_by)),
                    None => Err(e.into()),
                },
            }
        }

        async fn get_ppmp(&self, id: PpmpId) -> PlannerResult<Option<Ppmp>> {
            sqlx::query("SELECT * FROM ppmps WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(ppmp_from)
                .transpose()
        }

        async fn list_ppmps(&self, filter: &PpmpFilter, page: Page) -> PlannerResult<PageResult<Ppmp>> {
            let matches: Vec<Ppmp> = self
                .ppmps_where(filter.fiscal_year)
                .await?
                .into_iter()
                .filter(|p| filter.matches(p))
                .collect();
            Ok(paginate(matches, page))
        }

        async fn update_ppmp_status(&self, update: StatusUpdate) -> PlannerResult<Ppmp> {
            let remarks = update
                .remarks
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let row = sqlx::query(
                r#"
                UPDATE ppmps
                SET status = ?1, remarks = COALESCE(?2, remarks), version = version + 1, updated_at = ?3
                WHERE id = ?4 AND version = ?5
                RETURNING *
                "#,
            )
            .bind(update.status.as_str())
            .bind(remarks)
            .bind(Utc::now())
            .bind(update.ppmp_id)
            .bind(update.expected_version)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => ppmp_from(&row),
                None if self.get_ppmp(update.ppmp_id).await?.is_some() => {
                    Err(PlannerError::Conflict(ConflictKind::StaleWrite {
                        entity: "ppmp",
                        id: update.ppmp_id,
                    }))
                }
                None => Err(PlannerError::not_found("ppmp", update.ppmp_id)),
            }
        }

        async fn delete_ppmp(&self, id: PpmpId) -> PlannerResult<()> {
            self.delete_by_id("ppmps", "ppmp", id).await
        }

        async fn insert_row(&self, ppmp_id: PpmpId, fields: RowFields) -> PlannerResult<PpmpRow> {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO ppmp_rows (
                    ppmp_id, general_description, project_type, items, procurement_mode,
                    pre_procurement_conference, procurement_start_date, procurement_end_date,
                    delivery_period, source_of_funds, estimated_budget, attachments, remarks,
                    app_status, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '[]', ?12, 'pending', ?13, ?13)
                RETURNING *
                "#,
            )
            .bind(ppmp_id)
            .bind(&fields.general_description)
            .bind(fields.project_type.as_str())
            .bind(serde_json::to_string(&fields.items)?)
            .bind(fields.procurement_mode.map(|mode| mode.as_str()))
            .bind(fields.pre_procurement_conference)
            .bind(fields.procurement_start_date)
            .bind(fields.procurement_end_date)
            .bind(fields.delivery_period)
            .bind(&fields.source_of_funds)
            .bind(fields.estimated_budget)
            .bind(serde_json::to_string(&fields.remarks)?)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => ppmp_row_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("ppmp", ppmp_id))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn get_row(&self, id: RowId) -> PlannerResult<Option<PpmpRow>> {
            sqlx::query("SELECT * FROM ppmp_rows WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(ppmp_row_from)
                .transpose()
        }

        async fn list_rows(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<PpmpRow>> {
            let rows = sqlx::query("SELECT * FROM ppmp_rows WHERE ppmp_id = ?1 ORDER BY id")
                .bind(ppmp_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(ppmp_row_from).collect()
        }

        async fn count_rows(&self, ppmp_id: PpmpId) -> PlannerResult<usize> {
            let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM ppmp_rows WHERE ppmp_id = ?1")
                .bind(ppmp_id)
                .fetch_one(&self.pool)
                .await?
                .try_get("n")?;
            usize::try_from(count).map_err(|e| corrupt("ppmp_rows", e))
        }

        async fn update_row(&self, id: RowId, fields: RowFields) -> PlannerResult<PpmpRow> {
            let row = sqlx::query(
                r#"
                UPDATE ppmp_rows
                SET general_description = ?1, project_type = ?2, items = ?3, procurement_mode = ?4,
                    pre_procurement_conference = ?5, procurement_start_date = ?6,
                    procurement_end_date = ?7, delivery_period = ?8, source_of_funds = ?9,
                    estimated_budget = ?10, remarks = ?11, updated_at = ?12
                WHERE id = ?13
                RETURNING *
                "#,
            )
            .bind(&fields.general_description)
            .bind(fields.project_type.as_str())
            .bind(serde_json::to_string(&fields.items)?)
            .bind(fields.procurement_mode.map(|mode| mode.as_str()))
            .bind(fields.pre_procurement_conference)
            .bind(fields.procurement_start_date)
            .bind(fields.procurement_end_date)
            .bind(fields.delivery_period)
            .bind(&fields.source_of_funds)
            .bind(fields.estimated_budget)
            .bind(serde_json::to_string(&fields.remarks)?)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
            ppmp_row_from(&row)
        }

        async fn set_row_attachments(&self, id: RowId, attachments: Vec<Attachment>) -> PlannerResult<PpmpRow> {
            let row = sqlx::query("UPDATE ppmp_rows SET attachments = ?1, updated_at = ?2 WHERE id = ?3 RETURNING *")
                .bind(serde_json::to_string(&attachments)?)
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
            ppmp_row_from(&row)
        }

        async fn set_row_app_status(&self, id: RowId, status: AppStatus) -> PlannerResult<PpmpRow> {
            let row = sqlx::query("UPDATE ppmp_rows SET app_status = ?1, updated_at = ?2 WHERE id = ?3 RETURNING *")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
            ppmp_row_from(&row)
        }

        async fn delete_row(&self, id: RowId) -> PlannerResult<()> {
            self.delete_by_id("ppmp_rows", "ppmp row", id).await
        }

        async fn list_app_rows(&self, filter: &RowFilter, page: Page) -> PlannerResult<PageResult<PpmpRow>> {
            let ppmps: BTreeMap<PpmpId, Ppmp> = self
                .ppmps_where(filter.fiscal_year)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
            let rows = sqlx::query("SELECT * FROM ppmp_rows ORDER BY ppmp_id DESC, id ASC")
                .fetch_all(&self.pool)
                .await?;
            let mut matches = Vec::new();
            for row in &rows {
                let row = ppmp_row_from(row)?;
                if ppmps
                    .get(&row.ppmp_id)
                    .is_some_and(|ppmp| filter.matches(&row, ppmp))
                {
                    matches.push(row);
                }
            }
            Ok(paginate(matches, page))
        }

        async fn insert_row_remark(&self, remark: NewRowRemark) -> PlannerResult<RowRemark> {
            let result = sqlx::query(
                r#"
                INSERT INTO ppmp_row_remarks (ppmp_row_id, text, role, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                RETURNING *
                "#,
            )
            .bind(remark.ppmp_row_id)
            .bind(&remark.text)
            .bind(&remark.role)
            .bind(remark.created_by)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => row_remark_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("ppmp row", remark.ppmp_row_id))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn list_row_remarks(&self, row_id: RowId) -> PlannerResult<Vec<RowRemark>> {
            let rows = sqlx::query("SELECT * FROM ppmp_row_remarks WHERE ppmp_row_id = ?1 ORDER BY id")
                .bind(row_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_remark_from).collect()
        }

        async fn insert_bac_approval(&self, ppmp_id: PpmpId, user_id: UserId) -> PlannerResult<BacApproval> {
            let result = sqlx::query(
                r#"
                INSERT INTO ppmp_bac_approvals (ppmp_id, user_id, approved_at)
                VALUES (?1, ?2, ?3)
                RETURNING *
                "#,
            )
            .bind(ppmp_id)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => bac_approval_from(&row),
                Err(e) => match violation(&e) {
                    Some(Violation::Unique) => {
                        Err(PlannerError::Conflict(ConflictKind::AlreadyApproved { ppmp_id, user_id }))
                    }
                    Some(Violation::ForeignKey) => Err(PlannerError::not_found("ppmp", ppmp_id)),
                    None => Err(e.into()),
                },
            }
        }

        async fn list_bac_approvals(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<BacApproval>> {
            let rows = sqlx::query("SELECT * FROM ppmp_bac_approvals WHERE ppmp_id = ?1 ORDER BY id")
                .bind(ppmp_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(bac_approval_from).collect()
        }

        async fn insert_audit_entry(&self, entry: NewAuditEntry) -> PlannerResult<AuditLogEntry> {
            let result = sqlx::query(
                r#"
                INSERT INTO ppmp_audit_log (ppmp_id, user_id, action, from_status, to_status, remarks, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                RETURNING *
                "#,
            )
            .bind(entry.ppmp_id)
            .bind(entry.user_id)
            .bind(&entry.action)
            .bind(entry.from_status.as_str())
            .bind(entry.to_status.as_str())
            .bind(&entry.remarks)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => audit_entry_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("ppmp", entry.ppmp_id))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn list_audit_entries(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<AuditLogEntry>> {
            let rows = sqlx::query("SELECT * FROM ppmp_audit_log WHERE ppmp_id = ?1 ORDER BY id")
                .bind(ppmp_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(audit_entry_from).collect()
        }

        async fn get_app_approval(&self, fiscal_year: i32) -> PlannerResult<Option<AppApproval>> {
            sqlx::query("SELECT * FROM app_approvals WHERE fiscal_year = ?1")
                .bind(fiscal_year)
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(app_approval_from)
                .transpose()
        }

        async fn upsert_app_approval(
            &self,
            fiscal_year: i32,
            approved_by: UserId,
            approved_at: DateTime<Utc>,
        ) -> PlannerResult<AppApproval> {
            let row = sqlx::query(
                r#"
                INSERT INTO app_approvals (fiscal_year, approved_at, approved_by_user_id)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(fiscal_year) DO UPDATE
                SET approved_at = excluded.approved_at, approved_by_user_id = excluded.approved_by_user_id
                RETURNING *
                "#,
            )
            .bind(fiscal_year)
            .bind(approved_at)
            .bind(approved_by)
            .fetch_one(&self.pool)
            .await?;
            app_approval_from(&row)
        }

        async fn insert_purchase_request(&self, pr: NewPurchaseRequest) -> PlannerResult<PurchaseRequest> {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO purchase_requests (ppmp_row_id, created_by, status, reference_number, created_at, updated_at)
                VALUES (?1, ?2, 'draft', ?3, ?4, ?4)
                RETURNING *
                "#,
            )
            .bind(pr.ppmp_row_id)
            .bind(pr.created_by)
            .bind(&pr.reference_number)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => purchase_request_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("ppmp row", pr.ppmp_row_id))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn insert_purchase_request_items(
            &self,
            items: Vec<NewPurchaseRequestItem>,
        ) -> PlannerResult<Vec<PurchaseRequestItem>> {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let mut inserted = Vec::with_capacity(items.len());
            for item in &items {
                let result = sqlx::query(
                    r#"
                    INSERT INTO purchase_request_items (
                        purchase_request_id, ppmp_row_id, lot_index, item_index,
                        description, quantity, unit, estimated_cost, created_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    RETURNING *
                    "#,
                )
                .bind(item.purchase_request_id)
                .bind(item.ppmp_row_id)
                .bind(item.key.lot_index as i64)
                .bind(item.key.item_index as i64)
                .bind(&item.description)
                .bind(item.quantity)
                .bind(&item.unit)
                .bind(item.estimated_cost)
                .bind(now)
                .fetch_one(&mut *tx)
                .await;
                match result {
                    Ok(row) => inserted.push(purchase_request_item_from(&row)?),
                    Err(e) => {
                        return Err(match violation(&e) {
                            Some(Violation::Unique) => {
                                PlannerError::Conflict(ConflictKind::ItemAlreadyInPurchaseRequest {
                                    ppmp_row_id: item.ppmp_row_id,
                                    lot_index: item.key.lot_index,
                                    item_index: item.key.item_index,
                                })
                            }
                            Some(Violation::ForeignKey) => {
                                PlannerError::not_found("purchase request", item.purchase_request_id)
                            }
                            None => e.into(),
                        });
                    }
                }
            }
            tx.commit().await?;
            Ok(inserted)
        }

        async fn list_purchase_requests(&self, filter: &PurchaseRequestFilter) -> PlannerResult<Vec<PurchaseRequest>> {
            let rows = sqlx::query("SELECT * FROM purchase_requests ORDER BY id DESC")
                .fetch_all(&self.pool)
                .await?;
            let mut requests = Vec::new();
            for row in &rows {
                let pr = purchase_request_from(row)?;
                if filter.matches(&pr) {
                    requests.push(pr);
                }
            }
            Ok(requests)
        }

        async fn list_purchase_request_items(&self, row_id: RowId) -> PlannerResult<Vec<PurchaseRequestItem>> {
            let rows = sqlx::query("SELECT * FROM purchase_request_items WHERE ppmp_row_id = ?1 ORDER BY id")
                .bind(row_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(purchase_request_item_from).collect()
        }

        async fn insert_notification(&self, notification: NewNotification) -> PlannerResult<Notification> {
            let result = sqlx::query(
                r#"
                INSERT INTO notifications (user_id, type, title, message, link, read_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)
                RETURNING *
                "#,
            )
            .bind(notification.user_id)
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.link)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => notification_from(&row),
                Err(e) if matches!(violation(&e), Some(Violation::ForeignKey)) => {
                    Err(PlannerError::not_found("user", notification.user_id))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn list_notifications(&self, user_id: UserId, unread_only: bool) -> PlannerResult<Vec<Notification>> {
            let sql = if unread_only {
                "SELECT * FROM notifications WHERE user_id = ?1 AND read_at IS NULL ORDER BY id DESC"
            } else {
                "SELECT * FROM notifications WHERE user_id = ?1 ORDER BY id DESC"
            };
            let rows = sqlx::query(sql).bind(user_id).fetch_all(&self.pool).await?;
            rows.iter().map(notification_from).collect()
        }

        async fn mark_notification_read(
            &self,
            id: i64,
            user_id: UserId,
            read_at: DateTime<Utc>,
        ) -> PlannerResult<Notification> {
            let row = sqlx::query(
                r#"
                UPDATE notifications SET read_at = COALESCE(read_at, ?1)
                WHERE id = ?2 AND user_id = ?3
                RETURNING *
                "#,
            )
            .bind(read_at)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PlannerError::not_found("notification", id))?;
            notification_from(&row)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::model::{UserType, PpmpStatus};

        async fn store() -> SqliteStore {
            SqliteStore::connect(&DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                auto_migrate: true,
            })
            .await
            .unwrap()
        }

        #[tokio::test]
        async fn test_duplicate_ppmp_maps_to_conflict() {
            let store = store().await;
            let school = store.insert_school("Central ES", None).await.unwrap();
            let user = store
                .insert_user(NewUser {
                    name: "Supply".into(),
                    email: "supply@example.com".into(),
                    user_type: UserType::SupplyOfficerSchool,
                    designation: None,
                    school_id: Some(school.id),
                    office_id: None,
                })
                .await
                .unwrap();
            let new = NewPpmp {
                fiscal_year: 2025,
                end_user: EndUser::School(school.id),
                created_by: user.id,
            };
            store.insert_ppmp(new.clone()).await.unwrap();
            let err = store.insert_ppmp(new).await.unwrap_err();
            assert!(matches!(
                err,
                PlannerError::Conflict(ConflictKind::DuplicatePpmp { ref end_user, .. }) if end_user == "Central ES"
            ));
        }

        #[tokio::test]
        async fn test_status_update_is_conditional() {
            let store = store().await;
            let office = store.insert_office("Finance", None).await.unwrap();
            let user = store
                .insert_user(NewUser {
                    name: "Budget".into(),
                    email: "budget@example.com".into(),
                    user_type: UserType::BudgetOfficer,
                    designation: None,
                    school_id: None,
                    office_id: Some(office.id),
                })
                .await
                .unwrap();
            let ppmp = store
                .insert_ppmp(NewPpmp {
                    fiscal_year: 2025,
                    end_user: EndUser::Office(office.id),
                    created_by: user.id,
                })
                .await
                .unwrap();
            let update = StatusUpdate {
                ppmp_id: ppmp.id,
                expected_version: ppmp.version,
                status: PpmpStatus::Submitted,
                remarks: None,
            };
            let moved = store.update_ppmp_status(update.clone()).await.unwrap();
            assert_eq!(moved.version, ppmp.version + 1);
            let err = store.update_ppmp_status(update).await.unwrap_err();
            assert!(matches!(err, PlannerError::Conflict(ConflictKind::StaleWrite { .. })));

            let referenced = store.delete_user(user.id).await.unwrap_err();
            assert!(matches!(referenced, PlannerError::Referential { entity: "user", .. }));
        }
    }
}

#[cfg(feature = "database")]
static DB_STORE: std::sync::LazyLock<tokio::sync::RwLock<Option<SqliteStore>>> =
    std::sync::LazyLock::new(|| tokio::sync::RwLock::new(None));

#[cfg(feature = "database")]
/// Connect the configured database, if any, and keep it for shutdown.
pub async fn init_database(
    settings: Option<&crate::config::DatabaseConfig>,
) -> anyhow::Result<Option<SqliteStore>> {
    let Some(db_config) = settings else {
        tracing::info!("Database not configured, skipping initialization");
        return Ok(None);
    };
    tracing::info!("Initializing database at {}", db_config.url);
    let store = SqliteStore::connect(db_config).await?;
    *DB_STORE.write().await = Some(store.clone());
    tracing::info!("Database store initialized successfully");
    Ok(Some(store))
}

#[cfg(feature = "database")]
/// Shutdown database connections
pub async fn shutdown_database() {
    let guard = DB_STORE.read().await;
    if let Some(ref store) = *guard {
        store.shutdown().await;
    }
}

// Stub implementations for when database feature is not enabled
#[cfg(not(feature = "database"))]
pub async fn init_database(settings: Option<&crate::config::DatabaseConfig>) -> anyhow::Result<()> {
    if settings.is_some() {
        tracing::warn!("Database configured but the database feature is not enabled");
    } else {
        tracing::info!("Database feature not enabled, skipping database initialization");
    }
    Ok(())
}

#[cfg(not(feature = "database"))]
pub async fn shutdown_database() {
    tracing::info!("Database feature not enabled, no database to shutdown");
}
