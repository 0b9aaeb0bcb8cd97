use common::db::{SqlConnection, StoreId};
use std::fmt;

/// Where each operational store keeps its customers.
#[derive(Debug)]
pub struct CustomerColumns {
    pub table: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub phone: &'static str,
    pub email: &'static str,
}

#[derive(Debug)]
pub struct ProductColumns {
    pub table: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub price: &'static str,
}

#[derive(Debug)]
pub struct PurchaseColumns {
    pub table: &'static str,
    pub customer_id: &'static str,
    pub product_id: &'static str,
    pub quantity: &'static str,
    pub amount: &'static str,
    pub purchased_on: &'static str,
}

/// Field mapping of one source system onto the warehouse's shared shapes.
#[derive(Debug)]
pub struct SourceLayout {
    pub customers: CustomerColumns,
    pub products: ProductColumns,
    pub purchases: PurchaseColumns,
    /// Tables exposed by the table browser, in display order.
    pub tables: &'static [&'static str],
}

impl CustomerColumns {
    /// Selects (name, phone, email).
    pub fn extract_sql(&self) -> String {
        format!(
            "SELECT {}, {}, {} FROM {}",
            self.name, self.phone, self.email, self.table
        )
    }

    /// Selects (id, name).
    pub fn lookup_sql(&self) -> String {
        format!("SELECT {}, {} FROM {}", self.id, self.name, self.table)
    }
}

impl ProductColumns {
    /// Selects (name, category, price).
    pub fn extract_sql(&self) -> String {
        format!(
            "SELECT {}, {}, {} FROM {}",
            self.name, self.category, self.price, self.table
        )
    }

    /// Selects (id, name).
    pub fn lookup_sql(&self) -> String {
        format!("SELECT {}, {} FROM {}", self.id, self.name, self.table)
    }
}

impl PurchaseColumns {
    /// Selects (customer id, product id, quantity, amount, purchase date).
    pub fn extract_sql(&self) -> String {
        format!(
            "SELECT {}, {}, {}, {}, {} FROM {}",
            self.customer_id,
            self.product_id,
            self.quantity,
            self.amount,
            self.purchased_on,
            self.table
        )
    }

    pub fn distinct_dates_sql(&self) -> String {
        format!("SELECT DISTINCT {} FROM {}", self.purchased_on, self.table)
    }
}

pub static DB1_LAYOUT: SourceLayout = SourceLayout {
    customers: CustomerColumns {
        table: "Customer",
        id: "Cid",
        name: "Cname",
        phone: "Phone",
        email: "Email",
    },
    products: ProductColumns {
        table: "Product",
        id: "Pid",
        name: "Pname",
        category: "Category",
        price: "Price",
    },
    purchases: PurchaseColumns {
        table: "Purchases",
        customer_id: "Cid",
        product_id: "Pid",
        quantity: "Quantity",
        amount: "TotalAmount",
        purchased_on: "PurchaseDate",
    },
    tables: &["Customer", "Product", "Purchases"],
};

pub static DB2_LAYOUT: SourceLayout = SourceLayout {
    customers: CustomerColumns {
        table: "CustomerInfo",
        id: "Cid",
        name: "Cname",
        phone: "PhoneNum",
        email: "Email",
    },
    products: ProductColumns {
        table: "Item",
        id: "Pid",
        name: "Pname",
        category: "Type",
        price: "Price",
    },
    purchases: PurchaseColumns {
        table: "Purchase",
        customer_id: "Cid",
        product_id: "Pid",
        quantity: "Qty",
        amount: "Amount",
        purchased_on: "PurchaseDate",
    },
    tables: &["Customers", "CustomerInfo", "Item", "Purchase"],
};

/// Physical location seeded into `BranchDim` for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchSeed {
    pub city: &'static str,
    pub province: &'static str,
    pub country: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSystem {
    Db1,
    Db2,
}

impl SourceSystem {
    /// Load order of the sources. Branch surrogate keys follow it.
    pub const ALL: [SourceSystem; 2] = [SourceSystem::Db1, SourceSystem::Db2];

    pub fn layout(self) -> &'static SourceLayout {
        match self {
            SourceSystem::Db1 => &DB1_LAYOUT,
            SourceSystem::Db2 => &DB2_LAYOUT,
        }
    }

    /// `BranchDim` key of every fact loaded from this source. Relies on the
    /// branch rows being inserted first, in `ALL` order, right after a reset.
    pub fn branch_id(self) -> i64 {
        match self {
            SourceSystem::Db1 => 1,
            SourceSystem::Db2 => 2,
        }
    }

    pub fn branch(self) -> BranchSeed {
        match self {
            SourceSystem::Db1 => BranchSeed {
                city: "Branch1City",
                province: "Province1",
                country: "Country1",
            },
            SourceSystem::Db2 => BranchSeed {
                city: "Branch2City",
                province: "Province2",
                country: "Country2",
            },
        }
    }

    pub fn store(self) -> StoreId {
        match self {
            SourceSystem::Db1 => StoreId::Db1,
            SourceSystem::Db2 => StoreId::Db2,
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.store().as_str())
    }
}

/// Borrowed handles to both operational stores.
#[derive(Clone, Copy)]
pub struct SourceConnections<'a> {
    pub db1: &'a dyn SqlConnection,
    pub db2: &'a dyn SqlConnection,
}

impl<'a> SourceConnections<'a> {
    pub fn get(&self, source: SourceSystem) -> &'a dyn SqlConnection {
        match source {
            SourceSystem::Db1 => self.db1,
            SourceSystem::Db2 => self.db2,
        }
    }

    /// Both sources in load order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceSystem, &'a dyn SqlConnection)> + '_ {
        SourceSystem::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_mappings_differ_per_source() {
        assert_eq!(
            DB1_LAYOUT.customers.extract_sql(),
            "SELECT Cname, Phone, Email FROM Customer"
        );
        assert_eq!(
            DB2_LAYOUT.customers.extract_sql(),
            "SELECT Cname, PhoneNum, Email FROM CustomerInfo"
        );
        assert_eq!(
            DB2_LAYOUT.products.extract_sql(),
            "SELECT Pname, Type, Price FROM Item"
        );
        assert_eq!(
            DB1_LAYOUT.purchases.extract_sql(),
            "SELECT Cid, Pid, Quantity, TotalAmount, PurchaseDate FROM Purchases"
        );
        assert_eq!(
            DB2_LAYOUT.purchases.distinct_dates_sql(),
            "SELECT DISTINCT PurchaseDate FROM Purchase"
        );
    }

    #[test]
    fn test_branch_ids_follow_load_order() {
        let ids: Vec<i64> = SourceSystem::ALL.iter().map(|s| s.branch_id()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(SourceSystem::Db2.to_string(), "db2");
    }
}
