use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::{AsChangeset, Identifiable, Insertable, Queryable};
use diesel::Selectable;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// Tenants

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::tenants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TenantEntity {
    pub id: i32,
    pub name: String,
    pub legal_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub currency: String,
    pub timezone: String,
    pub opening_hours: Option<Value>,
    pub invoice_footer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::tenants)]
pub struct CreateTenantEntity {
    pub name: String,
    pub legal_name: Option<String>,
    pub currency: String,
    pub timezone: String,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::tenants)]
pub struct UpdateTenantEntity {
    pub name: Option<String>,
    pub legal_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub currency: Option<String>,
    pub timezone: Option<String>,
    pub opening_hours: Option<Value>,
    pub invoice_footer: Option<String>,
}

// Staff

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::staff_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StaffEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::staff_accounts)]
pub struct CreateStaffEntity {
    pub tenant_id: i32,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::staff_accounts)]
pub struct UpdateStaffEntity {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::specialties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SpecialtyEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::specialties)]
pub struct CreateSpecialtyEntity {
    pub tenant_id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::staff_specialties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StaffSpecialtyEntity {
    pub staff_id: i32,
    pub specialty_id: i32,
}

// Customers and pets

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::customers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CustomerEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::customers)]
pub struct CreateCustomerEntity {
    pub tenant_id: i32,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::customers)]
pub struct UpdateCustomerEntity {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::pets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PetEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub customer_id: i32,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::pets)]
pub struct CreatePetEntity {
    pub tenant_id: i32,
    pub customer_id: i32,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::pets)]
pub struct UpdatePetEntity {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<Decimal>,
    pub notes: Option<String>,
}

// Appointments

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AppointmentEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub pet_id: i32,
    pub customer_id: i32,
    pub staff_id: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::appointments)]
pub struct CreateAppointmentEntity {
    pub tenant_id: i32,
    pub pet_id: i32,
    pub customer_id: i32,
    pub staff_id: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::appointments)]
pub struct UpdateAppointmentEntity {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub staff_id: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

// Procedures and treatment plans

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::procedures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProcedureEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub duration_minutes: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::procedures)]
pub struct CreateProcedureEntity {
    pub tenant_id: i32,
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub duration_minutes: Option<i32>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::procedures)]
pub struct UpdateProcedureEntity {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::treatment_plans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TreatmentPlanEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub pet_id: i32,
    pub staff_id: i32,
    pub title: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::treatment_plans)]
pub struct CreateTreatmentPlanEntity {
    pub tenant_id: i32,
    pub pet_id: i32,
    pub staff_id: i32,
    pub title: String,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::treatment_plan_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TreatmentPlanItemEntity {
    pub id: i32,
    pub plan_id: i32,
    pub procedure_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::treatment_plan_items)]
pub struct CreateTreatmentPlanItemEntity {
    pub plan_id: i32,
    pub procedure_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
}

// Suppliers and brands

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::suppliers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SupplierEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::suppliers)]
pub struct CreateSupplierEntity {
    pub tenant_id: i32,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::suppliers)]
pub struct UpdateSupplierEntity {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::brands)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BrandEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub supplier_id: Option<i32>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::brands)]
pub struct CreateBrandEntity {
    pub tenant_id: i32,
    pub supplier_id: Option<i32>,
    pub name: String,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::brands)]
pub struct UpdateBrandEntity {
    pub supplier_id: Option<i32>,
    pub name: Option<String>,
}

// Products and inventory

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::product_units)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductUnitEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    pub abbreviation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::product_units)]
pub struct CreateProductUnitEntity {
    pub tenant_id: i32,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub sku: String,
    pub name: String,
    pub brand_id: Option<i32>,
    pub supplier_id: Option<i32>,
    pub unit_id: Option<i32>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub stock_quantity: i32,
    pub min_stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub tenant_id: i32,
    pub sku: String,
    pub name: String,
    pub brand_id: Option<i32>,
    pub supplier_id: Option<i32>,
    pub unit_id: Option<i32>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub stock_quantity: i32,
    pub min_stock: i32,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::products)]
pub struct UpdateProductEntity {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub brand_id: Option<i32>,
    pub supplier_id: Option<i32>,
    pub unit_id: Option<i32>,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::stock_movements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockMovementEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub product_id: i32,
    pub staff_id: i32,
    pub movement_type: String,
    pub quantity: i32,
    pub reason: Option<String>,
    pub order_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::stock_movements)]
pub struct CreateStockMovementEntity {
    pub tenant_id: i32,
    pub product_id: i32,
    pub staff_id: i32,
    pub movement_type: String,
    pub quantity: i32,
    pub reason: Option<String>,
    pub order_id: Option<i32>,
}

// Orders and payments

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub tenant_id: i32,
    pub customer_id: Option<i32>,
    pub staff_id: i32,
    pub status: String,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub tenant_id: i32,
    pub customer_id: Option<i32>,
    pub staff_id: i32,
    pub status: String,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: Option<i32>,
    pub procedure_id: Option<i32>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: Option<i32>,
    pub procedure_id: Option<i32>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub method: String,
    pub amount: Decimal,
    pub tendered: Option<Decimal>,
    pub change_given: Option<Decimal>,
    pub reference: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::payments)]
pub struct CreatePaymentEntity {
    pub order_id: i32,
    pub method: String,
    pub amount: Decimal,
    pub tendered: Option<Decimal>,
    pub change_given: Option<Decimal>,
    pub reference: Option<String>,
    pub status: String,
}
