use async_trait::async_trait;
use chrono::Utc;
use diesel::QueryableByName;
use diesel::sql_types::Text;

use super::{FamilyStore, format_timestamp, parse_enum, parse_timestamp};
use crate::db::models::{Family, FamilyMember, FamilyRole};
use crate::db::{Database, DatabaseError, Statement};
use crate::params;

#[derive(QueryableByName)]
struct DbFamily {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    owner_id: String,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl DbFamily {
    fn to_family(&self) -> Result<Family, DatabaseError> {
        Ok(Family {
            id: self.id.clone(),
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbFamilyMember {
    #[diesel(sql_type = Text)]
    family_id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    email: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    role: String,
    #[diesel(sql_type = Text)]
    joined_at: String,
}

impl DbFamilyMember {
    fn to_member(&self) -> Result<FamilyMember, DatabaseError> {
        Ok(FamilyMember {
            family_id: self.family_id.clone(),
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: parse_enum(&self.role)?,
            joined_at: parse_timestamp(&self.joined_at)?,
        })
    }
}

const INSERT_MEMBER: &str =
    "INSERT INTO family_members (family_id, user_id, role, joined_at) VALUES ($1, $2, $3, $4)";

pub struct SqlFamilyStore {
    db: Database,
}

impl SqlFamilyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FamilyStore for SqlFamilyStore {
    async fn create_family(&self, family: &Family) -> Result<(), DatabaseError> {
        let created_at = format_timestamp(&family.created_at);
        self.db
            .execute_batch(vec![
                Statement::new(
                    "INSERT INTO families (id, name, owner_id, created_at) VALUES ($1, $2, $3, $4)",
                    params![&family.id, &family.name, &family.owner_id, &created_at],
                ),
                Statement::new(
                    INSERT_MEMBER,
                    params![
                        &family.id,
                        &family.owner_id,
                        FamilyRole::Owner.as_str(),
                        &created_at
                    ],
                ),
            ])
            .await?;
        Ok(())
    }

    async fn family_for_user(&self, user_id: &str) -> Result<Option<Family>, DatabaseError> {
        let row: Option<DbFamily> = self
            .db
            .fetch_optional(
                "SELECT f.id, f.name, f.owner_id, f.created_at FROM families f \
                 JOIN family_members m ON m.family_id = f.id WHERE m.user_id = $1",
                params![user_id],
            )
            .await?;
        row.map(|r| r.to_family()).transpose()
    }

    async fn list_members(&self, family_id: &str) -> Result<Vec<FamilyMember>, DatabaseError> {
        let rows: Vec<DbFamilyMember> = self
            .db
            .fetch_all(
                "SELECT m.family_id, m.user_id, u.email, u.name, m.role, m.joined_at \
                 FROM family_members m JOIN users u ON u.id = m.user_id \
                 WHERE m.family_id = $1 ORDER BY m.joined_at, u.email",
                params![family_id],
            )
            .await?;
        rows.iter().map(DbFamilyMember::to_member).collect()
    }

    async fn add_member(
        &self,
        family_id: &str,
        user_id: &str,
        role: FamilyRole,
    ) -> Result<(), DatabaseError> {
        self.db
            .execute(
                INSERT_MEMBER,
                params![
                    family_id,
                    user_id,
                    role.as_str(),
                    format_timestamp(&Utc::now())
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_member(&self, family_id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM family_members WHERE family_id = $1 AND user_id = $2",
                params![family_id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete_family(&self, family_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute("DELETE FROM families WHERE id = $1", params![family_id])
            .await?;
        Ok(affected > 0)
    }
}
