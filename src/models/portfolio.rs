use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "cost_basis_method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostBasisMethod {
    Fifo,
    Lifo,
    SpecificLot,
}

impl Default for CostBasisMethod {
    fn default() -> Self {
        CostBasisMethod::Fifo
    }
}

// Accounting container owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Portfolio {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub name: String,
    pub description: Option<String>,
    pub base_currency: String,
    pub cost_basis_method: CostBasisMethod,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePortfolio {
    pub name: String,
    pub description: Option<String>,
    pub base_currency: Option<String>,
    pub cost_basis_method: Option<CostBasisMethod>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdatePortfolio {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost_basis_method: Option<CostBasisMethod>,
}

impl Portfolio {
    pub(crate) fn new(
        user_id: uuid::Uuid,
        name: String,
        description: Option<String>,
        base_currency: String,
        cost_basis_method: CostBasisMethod,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::now_v7(),
            user_id,
            name,
            description,
            base_currency,
            cost_basis_method,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: uuid::Uuid) -> bool {
        self.user_id == user_id
    }
}
