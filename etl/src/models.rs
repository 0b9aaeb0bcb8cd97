use chrono::NaiveDate;
use common::db::SqlValue;

/// Trimmed text of a name cell; `None` for NULL.
pub fn normalize_name(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Text(s) => Some(s.trim().to_string()),
        other => Some(other.to_string().trim().to_string()),
    }
}

fn normalize_text(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(s) => SqlValue::Text(s.trim().to_string()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub full_name: Option<String>,
    pub phone: SqlValue,
    pub email: SqlValue,
}

impl CustomerRow {
    /// From a (name, phone, email) source row.
    pub fn from_source(row: &[SqlValue]) -> Option<Self> {
        match row {
            [name, phone, email] => Some(Self {
                full_name: normalize_name(name),
                phone: normalize_text(phone),
                email: normalize_text(email),
            }),
            _ => None,
        }
    }

    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            self.full_name.clone().into(),
            self.phone.clone(),
            self.email.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub product_name: Option<String>,
    pub category: SqlValue,
    pub unit_price: f64,
}

impl ProductRow {
    /// From a (name, category, price) source row. Missing or non-numeric
    /// prices load as zero.
    pub fn from_source(row: &[SqlValue]) -> Option<Self> {
        match row {
            [name, category, price] => Some(Self {
                product_name: normalize_name(name),
                category: normalize_text(category),
                unit_price: price.as_f64().unwrap_or(0.0),
            }),
            _ => None,
        }
    }

    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            self.product_name.clone().into(),
            self.category.clone(),
            SqlValue::Float(self.unit_price),
        ]
    }
}

/// One purchase as read from a source's fact-like table.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub customer_id: Option<i64>,
    pub product_id: Option<i64>,
    pub quantity: i64,
    pub amount: f64,
    pub purchased_on: Option<NaiveDate>,
    pub raw_date: SqlValue,
}

impl PurchaseRecord {
    /// From a (customer id, product id, quantity, amount, date) source row.
    pub fn from_source(row: &[SqlValue]) -> Option<Self> {
        match row {
            [customer_id, product_id, quantity, amount, purchased_on] => Some(Self {
                customer_id: customer_id.as_i64(),
                product_id: product_id.as_i64(),
                quantity: quantity.as_i64().unwrap_or(0),
                amount: amount.as_f64().unwrap_or(0.0),
                purchased_on: purchased_on.as_date(),
                raw_date: purchased_on.clone(),
            }),
            _ => None,
        }
    }
}

/// A consolidated `FactSales` row, all references already resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactRow {
    pub product_id: i64,
    pub customer_id: i64,
    pub date_id: i64,
    pub branch_id: i64,
    pub quantity: i64,
    pub revenue: f64,
}

impl FactRow {
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.product_id),
            SqlValue::Int(self.customer_id),
            SqlValue::Int(self.date_id),
            SqlValue::Int(self.branch_id),
            SqlValue::Int(self.quantity),
            SqlValue::Float(self.revenue),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_row_trims_and_keeps_nulls() {
        let row = CustomerRow::from_source(&[
            SqlValue::from("  Alice "),
            SqlValue::Null,
            "alice@example.com".into(),
        ])
        .unwrap();

        assert_eq!(row.full_name.as_deref(), Some("Alice"));
        assert_eq!(row.params()[1], SqlValue::Null);
        assert!(CustomerRow::from_source(&[SqlValue::from("only one")]).is_none());
    }

    #[test]
    fn test_product_price_defaults_to_zero() {
        let priced = ProductRow::from_source(&[
            SqlValue::from("Lamp"),
            "Home".into(),
            "19.99".into(),
        ])
        .unwrap();
        assert_eq!(priced.unit_price, 19.99);

        let unpriced = ProductRow::from_source(&[
            SqlValue::from("Lamp"),
            "Home".into(),
            SqlValue::Null,
        ])
        .unwrap();
        assert_eq!(unpriced.unit_price, 0.0);
    }

    #[test]
    fn test_purchase_record_parses_decimal_text() {
        let record = PurchaseRecord::from_source(&[
            SqlValue::Int(3),
            SqlValue::UInt(7),
            SqlValue::Int(2),
            "25.50".into(),
            "2024-01-02".into(),
        ])
        .unwrap();

        assert_eq!(record.customer_id, Some(3));
        assert_eq!(record.product_id, Some(7));
        assert_eq!(record.amount, 25.5);
        assert_eq!(record.purchased_on, NaiveDate::from_ymd_opt(2024, 1, 2));
    }
}
