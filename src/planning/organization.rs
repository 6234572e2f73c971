// Schools, offices and user accounts

use std::sync::Arc;
use tracing::info;

use crate::error::{PlannerError, PlannerResult};
use crate::model::{EndUser, NewUser, Office, OfficeId, School, SchoolId, User, UserId};
use crate::store::{RecordStore, UserFilter};
use crate::validation::{required, validate_email};

#[derive(Clone)]
pub struct Organization {
    store: Arc<dyn RecordStore>,
}

impl Organization {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create_school(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<School> {
        let name = required("name", name)?;
        let school = self.store.insert_school(&name, head_user_id).await?;
        info!(school.id = school.id, name = %school.name, "School created");
        Ok(school)
    }

    pub async fn create_office(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<Office> {
        let name = required("name", name)?;
        let office = self.store.insert_office(&name, head_user_id).await?;
        info!(office.id = office.id, name = %office.name, "Office created");
        Ok(office)
    }

    /// School user types belong to a school; division types to an office.
    pub async fn create_user(&self, user: NewUser) -> PlannerResult<User> {
        let name = required("name", &user.name)?;
        validate_email(&user.email)?;
        let kind = user.user_type;
        if kind.is_school_user() && user.school_id.is_none() {
            return Err(PlannerError::validation(
                "school_id",
                format!("a {kind} account needs a school"),
            ));
        }
        if kind.is_division_user() && user.office_id.is_none() {
            return Err(PlannerError::validation(
                "office_id",
                format!("a {kind} account needs an office"),
            ));
        }
        let designation = user
            .designation
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let created = self
            .store
            .insert_user(NewUser {
                name,
                designation,
                ..user
            })
            .await?;
        info!(user.id = created.id, user_type = %created.user_type, "User created");
        Ok(created)
    }

    pub async fn set_active(&self, user_id: UserId, is_active: bool) -> PlannerResult<User> {
        let user = self.store.set_user_active(user_id, is_active).await?;
        info!(user.id = user_id, is_active, "User activation changed");
        Ok(user)
    }

    /// Makes `head_user_id` the unit head of a school or office. The change
    /// applies to every PPMP of that end user from the next transition on.
    pub async fn set_unit_head(&self, end_user: EndUser, head_user_id: Option<UserId>) -> PlannerResult<()> {
        if let Some(head) = head_user_id {
            let user = self
                .store
                .get_user(head)
                .await?
                .ok_or_else(|| PlannerError::not_found("user", head))?;
            if !user.is_active {
                return Err(PlannerError::validation(
                    "head_user_id",
                    format!("user {head} is inactive"),
                ));
            }
        }
        match end_user {
            EndUser::School(id) => {
                self.store.set_school_head(id, head_user_id).await?;
            }
            EndUser::Office(id) => {
                self.store.set_office_head(id, head_user_id).await?;
            }
        }
        info!(end_user = %end_user, head = ?head_user_id, "Unit head changed");
        Ok(())
    }

    pub async fn schools(&self) -> PlannerResult<Vec<School>> {
        self.store.list_schools().await
    }

    pub async fn offices(&self) -> PlannerResult<Vec<Office>> {
        self.store.list_offices().await
    }

    pub async fn users(&self, filter: &UserFilter) -> PlannerResult<Vec<User>> {
        self.store.list_users(filter).await
    }

    pub async fn user(&self, user_id: UserId) -> PlannerResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("user", user_id))
    }

    pub async fn delete_school(&self, id: SchoolId) -> PlannerResult<()> {
        self.store.delete_school(id).await?;
        info!(school.id = id, "School deleted");
        Ok(())
    }

    pub async fn delete_office(&self, id: OfficeId) -> PlannerResult<()> {
        self.store.delete_office(id).await?;
        info!(office.id = id, "Office deleted");
        Ok(())
    }

    pub async fn delete_user(&self, id: UserId) -> PlannerResult<()> {
        self.store.delete_user(id).await?;
        info!(user.id = id, "User deleted");
        Ok(())
    }
}
