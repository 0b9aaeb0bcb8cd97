use common::Error;
use common::Result;
use common::db::SqlConnection;

use crate::report::{RunLog, StepSummary};

pub const BRANCH_DIM: &str = "BranchDim";
pub const CUSTOMER_DIM: &str = "CustomerDim";
pub const PRODUCT_DIM: &str = "ProductDim";
pub const DATETIME_DIM: &str = "DatetimeDim";
pub const FACT_SALES: &str = "FactSales";

/// Warehouse tables, fact table first. This is both the truncate order and
/// the table browser's display order.
pub const WAREHOUSE_TABLES: [&str; 5] = [
    FACT_SALES,
    CUSTOMER_DIM,
    PRODUCT_DIM,
    DATETIME_DIM,
    BRANCH_DIM,
];

pub struct TableDefinition {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// Dimensions before the fact table so its foreign keys have targets.
pub const WAREHOUSE_SCHEMA: [TableDefinition; 5] = [
    TableDefinition {
        name: BRANCH_DIM,
        ddl: "CREATE TABLE IF NOT EXISTS BranchDim (
          BranchID INT AUTO_INCREMENT PRIMARY KEY,
          City VARCHAR(100) NOT NULL,
          Province VARCHAR(100) NOT NULL,
          Country VARCHAR(100) NOT NULL
        ) ENGINE=InnoDB",
    },
    TableDefinition {
        name: CUSTOMER_DIM,
        ddl: "CREATE TABLE IF NOT EXISTS CustomerDim (
          CustomerID INT AUTO_INCREMENT PRIMARY KEY,
          FullName VARCHAR(255) NOT NULL,
          Phone VARCHAR(50),
          Email VARCHAR(255)
        ) ENGINE=InnoDB",
    },
    TableDefinition {
        name: PRODUCT_DIM,
        ddl: "CREATE TABLE IF NOT EXISTS ProductDim (
          ProductID INT AUTO_INCREMENT PRIMARY KEY,
          ProductName VARCHAR(255) NOT NULL,
          Category VARCHAR(120),
          UnitPrice DECIMAL(10,2) NOT NULL DEFAULT 0.00
        ) ENGINE=InnoDB",
    },
    TableDefinition {
        name: DATETIME_DIM,
        ddl: "CREATE TABLE IF NOT EXISTS DatetimeDim (
          DateID INT AUTO_INCREMENT PRIMARY KEY,
          FullDate DATE NOT NULL,
          UNIQUE KEY uq_full_date (FullDate)
        ) ENGINE=InnoDB",
    },
    TableDefinition {
        name: FACT_SALES,
        ddl: "CREATE TABLE IF NOT EXISTS FactSales (
          FactID INT AUTO_INCREMENT PRIMARY KEY,
          ProductID INT NOT NULL,
          CustomerID INT NOT NULL,
          DateID INT NOT NULL,
          BranchID INT NOT NULL,
          Quantity INT NOT NULL DEFAULT 0,
          Revenue DECIMAL(12,2) NOT NULL DEFAULT 0.00,
          KEY idx_prod (ProductID),
          KEY idx_cust (CustomerID),
          KEY idx_date (DateID),
          KEY idx_branch (BranchID),
          CONSTRAINT fk_fact_prod   FOREIGN KEY (ProductID)  REFERENCES ProductDim(ProductID),
          CONSTRAINT fk_fact_cust   FOREIGN KEY (CustomerID) REFERENCES CustomerDim(CustomerID),
          CONSTRAINT fk_fact_date   FOREIGN KEY (DateID)     REFERENCES DatetimeDim(DateID),
          CONSTRAINT fk_fact_branch FOREIGN KEY (BranchID)   REFERENCES BranchDim(BranchID)
        ) ENGINE=InnoDB",
    },
];

pub struct SchemaProvisioner;

impl SchemaProvisioner {
    /// Creates any missing warehouse table. A failing statement is logged
    /// and the remaining tables are still attempted.
    pub async fn provision(warehouse: &dyn SqlConnection, log: &mut RunLog) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        for table in &WAREHOUSE_SCHEMA {
            let result = warehouse
                .execute(table.ddl, &[])
                .await
                .map_err(|e| Error::Provisioning {
                    table: table.name.to_string(),
                    message: e.to_string(),
                });

            match &result {
                Ok(_) => log.success(format!("Table {} ready", table.name)),
                Err(e) => log.failure(e.to_string()),
            }
            summary.record(&result);
        }

        Ok(summary)
    }
}
