use crate::framework::DatabaseProcessor;
use curio_sdk::objects::ShippingAddress;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AddressRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub line: String,
    pub subdistrict: String,
    pub district: String,
    pub province: String,
    pub zipcode: String,
    pub is_default: bool,
}

impl From<AddressRecord> for ShippingAddress {
    fn from(address: AddressRecord) -> Self {
        ShippingAddress {
            name: address.name,
            phone: address.phone,
            line: address.line,
            subdistrict: address.subdistrict,
            district: address.district,
            province: address.province,
            zipcode: address.zipcode,
        }
    }
}

/// A seller's registered payout destination.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SellerProfile {
    pub user_id: Uuid,
    pub recipient_id: String,
    pub bank_brand: String,
    pub account_number: String,
    pub account_name: String,
    pub verified: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct GetUserById {
    pub user_id: Uuid,
}

impl Processor<GetUserById> for DatabaseProcessor {
    type Output = Option<UserRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserById")]
    async fn process(&self, query: GetUserById) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, first_name, last_name, email FROM users WHERE id = $1",
        )
        .bind(query.user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListAddressesByUser {
    pub user_id: Uuid,
}

impl Processor<ListAddressesByUser> for DatabaseProcessor {
    type Output = Vec<AddressRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListAddressesByUser")]
    async fn process(&self, query: ListAddressesByUser) -> Result<Vec<AddressRecord>, sqlx::Error> {
        sqlx::query_as::<_, AddressRecord>(
            r#"
            SELECT id, user_id, name, phone, line, subdistrict, district, province, zipcode, is_default
            FROM addresses
            WHERE user_id = $1
            ORDER BY is_default DESC
            "#,
        )
        .bind(query.user_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetSellerProfile {
    pub user_id: Uuid,
}

impl Processor<GetSellerProfile> for DatabaseProcessor {
    type Output = Option<SellerProfile>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSellerProfile")]
    async fn process(&self, query: GetSellerProfile) -> Result<Option<SellerProfile>, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(
            r#"
            SELECT user_id, recipient_id, bank_brand, account_number, account_name, verified, created_at
            FROM seller_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(query.user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Check whether a bank account is already registered to any seller.
pub struct AccountNumberTaken {
    pub account_number: String,
}

impl Processor<AccountNumberTaken> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AccountNumberTaken")]
    async fn process(&self, query: AccountNumberTaken) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM seller_profiles WHERE account_number = $1)",
        )
        .bind(query.account_number)
        .fetch_one(&self.pool)
        .await
    }
}

impl Processor<SellerProfile> for DatabaseProcessor {
    type Output = SellerProfile;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertSellerProfile")]
    async fn process(&self, profile: SellerProfile) -> Result<SellerProfile, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(
            r#"
            INSERT INTO seller_profiles
                (user_id, recipient_id, bank_brand, account_number, account_name, verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING user_id, recipient_id, bank_brand, account_number, account_name, verified, created_at
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.recipient_id)
        .bind(profile.bank_brand)
        .bind(profile.account_number)
        .bind(profile.account_name)
        .bind(profile.verified)
        .bind(profile.created_at)
        .fetch_one(&self.pool)
        .await
    }
}
