use chrono::NaiveDate;
use common::db::SqlValue;
use common::db::memory::MemoryConnection;
use etl::schema::{BRANCH_DIM, CUSTOMER_DIM, DATETIME_DIM, FACT_SALES, PRODUCT_DIM};
use etl::{EtlOrchestrator, EtlReport, LogStatus};

fn text(s: &str) -> SqlValue {
    SqlValue::from(s)
}

fn int(n: i64) -> SqlValue {
    SqlValue::Int(n)
}

fn day(y: i32, m: u32, d: u32) -> SqlValue {
    SqlValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn db1() -> MemoryConnection {
    MemoryConnection::new("db1")
        .with_table(
            "Customer",
            &["Cid", "Cname", "Phone", "Email"],
            vec![
                vec![int(1), text("Alice "), text("111"), text("alice@one.test")],
                vec![int(2), text("Bob"), SqlValue::Null, text("bob@one.test")],
            ],
        )
        .with_table(
            "Product",
            &["Pid", "Pname", "Category", "Price"],
            vec![
                vec![int(1), text("Lamp"), text("Home"), text("19.99")],
                vec![int(2), text("Desk"), text("Office"), text("120.00")],
            ],
        )
        .with_table(
            "Purchases",
            &["Cid", "Pid", "Quantity", "TotalAmount", "PurchaseDate"],
            vec![
                vec![int(1), int(1), int(2), text("39.98"), day(2024, 1, 1)],
                vec![int(2), int(2), int(1), text("120.00"), day(2024, 1, 2)],
                vec![int(99), int(1), int(1), text("19.99"), day(2024, 1, 2)],
            ],
        )
}

fn db2() -> MemoryConnection {
    MemoryConnection::new("db2")
        .with_table(
            "Customers",
            &["Cid", "Cname"],
            vec![vec![int(1), text("Legacy")]],
        )
        .with_table(
            "CustomerInfo",
            &["Cid", "Cname", "PhoneNum", "Email"],
            vec![
                vec![int(1), text("Carol"), text("333"), text("carol@two.test")],
                vec![int(2), text("Alice"), text("444"), text("alice@two.test")],
            ],
        )
        .with_table(
            "Item",
            &["Pid", "Pname", "Type", "Price"],
            vec![vec![int(1), text("Chair"), text("Office"), text("45.00")]],
        )
        .with_table(
            "Purchase",
            &["Cid", "Pid", "Qty", "Amount", "PurchaseDate"],
            vec![
                vec![int(1), int(1), int(4), text("180.00"), text("2024-01-03")],
                vec![int(2), int(1), int(1), text("45.00"), text("2024-01-02 10:30:00")],
            ],
        )
}

async fn run(
    db1: &MemoryConnection,
    db2: &MemoryConnection,
    warehouse: &MemoryConnection,
) -> EtlReport {
    EtlOrchestrator::new(db1, db2, warehouse).run().await
}

fn column(conn: &MemoryConnection, table: &str, index: usize) -> Vec<SqlValue> {
    conn.rows(table).into_iter().map(|r| r[index].clone()).collect()
}

#[tokio::test]
async fn test_full_refresh_loads_every_table() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));

    let report = run(&db1, &db2, &warehouse).await;

    assert!(report.completed, "{:#?}", report.lines());
    assert_eq!(
        report.lines().first().map(String::as_str),
        Some("Ensuring warehouse tables exist...")
    );
    assert_eq!(report.lines().last().map(String::as_str), Some("✅ ETL COMPLETE!"));

    assert_eq!(warehouse.rows(BRANCH_DIM).len(), 2);
    assert_eq!(
        column(&warehouse, CUSTOMER_DIM, 1),
        vec![text("Alice"), text("Bob"), text("Carol"), text("Alice")]
    );
    assert_eq!(warehouse.rows(PRODUCT_DIM).len(), 3);
    assert_eq!(
        warehouse.rows(DATETIME_DIM),
        vec![
            vec![int(1), day(2024, 1, 1)],
            vec![int(2), day(2024, 1, 2)],
            vec![int(3), day(2024, 1, 3)],
        ]
    );
    assert_eq!(report.facts_loaded, 4);
    assert_eq!(report.facts_skipped, 1);
    assert_eq!(warehouse.rows(FACT_SALES).len(), 4);
}

#[tokio::test]
async fn test_branch_follows_source() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    run(&db1, &db2, &warehouse).await;

    // FactID, ProductID, CustomerID, DateID, BranchID, Quantity, Revenue
    let branches = column(&warehouse, FACT_SALES, 4);
    assert_eq!(branches, vec![int(1), int(1), int(2), int(2)]);
    assert_eq!(
        warehouse.rows(BRANCH_DIM)[1],
        vec![int(2), text("Branch2City"), text("Province2"), text("Country2")]
    );
}

#[tokio::test]
async fn test_shared_names_resolve_to_last_loaded_customer() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    run(&db1, &db2, &warehouse).await;

    // db1's Alice (Cid 1) and db2's Alice (Cid 2) both land on CustomerID 4
    let facts = warehouse.rows(FACT_SALES);
    assert_eq!(facts[0][2], int(4));
    assert_eq!(facts[1][2], int(2));
    assert_eq!(facts[2][2], int(3));
    assert_eq!(facts[3][2], int(4));
    // datetime text in db2 collapses onto the existing calendar day
    assert_eq!(facts[3][3], int(2));
}

#[tokio::test]
async fn test_every_fact_references_existing_dimensions() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    run(&db1, &db2, &warehouse).await;

    let keys = |table: &str| column(&warehouse, table, 0);
    let (products, customers, dates, branches) = (
        keys(PRODUCT_DIM),
        keys(CUSTOMER_DIM),
        keys(DATETIME_DIM),
        keys(BRANCH_DIM),
    );
    for fact in warehouse.rows(FACT_SALES) {
        assert!(products.contains(&fact[1]));
        assert!(customers.contains(&fact[2]));
        assert!(dates.contains(&fact[3]));
        assert!(branches.contains(&fact[4]));
    }
}

#[tokio::test]
async fn test_rerun_yields_identical_warehouse() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));

    run(&db1, &db2, &warehouse).await;
    let first: Vec<_> = [BRANCH_DIM, CUSTOMER_DIM, PRODUCT_DIM, DATETIME_DIM, FACT_SALES]
        .iter()
        .map(|t| warehouse.rows(t))
        .collect();

    let second_report = run(&db1, &db2, &warehouse).await;
    let second: Vec<_> = [BRANCH_DIM, CUSTOMER_DIM, PRODUCT_DIM, DATETIME_DIM, FACT_SALES]
        .iter()
        .map(|t| warehouse.rows(t))
        .collect();

    assert!(second_report.completed);
    assert_eq!(first, second);
    assert!(warehouse.foreign_key_checks());
}

#[tokio::test]
async fn test_unresolvable_purchase_is_skipped_with_warning() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    let report = run(&db1, &db2, &warehouse).await;

    let warnings: Vec<_> = report
        .log
        .iter()
        .filter(|e| e.status == LogStatus::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Skipped db1.Purchases row 3: Unresolved customer id key '99'"
    );
}

#[tokio::test]
async fn test_provisioning_failure_does_not_stop_the_run() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    warehouse.fail_on("CREATE TABLE IF NOT EXISTS BranchDim");

    let report = run(&db1, &db2, &warehouse).await;

    assert!(report.completed);
    assert!(report.failures() > 0);
    assert!(!warehouse.has_table(BRANCH_DIM));
    assert_eq!(warehouse.rows(CUSTOMER_DIM).len(), 4);
    // every fact references the missing BranchDim
    assert_eq!(report.facts_loaded, 0);
    assert!(warehouse.rows(FACT_SALES).is_empty());
}

#[tokio::test]
async fn test_key_map_failure_aborts_before_facts() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    warehouse.fail_on("SELECT DateID, FullDate FROM DatetimeDim");

    let report = run(&db1, &db2, &warehouse).await;

    assert!(!report.completed);
    assert_eq!(report.lines().last().map(String::as_str), Some("❌ ETL ABORTED"));
    assert!(!report.lines().iter().any(|l| l.contains("ETL COMPLETE")));
    assert!(warehouse.rows(FACT_SALES).is_empty());
    assert_eq!(warehouse.rows(DATETIME_DIM).len(), 3);
}

#[tokio::test]
async fn test_missing_source_tables_are_logged_and_skipped() {
    let empty = MemoryConnection::new("db2");
    let (db1, warehouse) = (db1(), MemoryConnection::new("warehouse"));

    let report = run(&db1, &empty, &warehouse).await;

    assert!(report.completed);
    assert_eq!(warehouse.rows(CUSTOMER_DIM).len(), 2);
    assert_eq!(report.facts_loaded, 2);
    let expected =
        "❌ Loading FactSales from db2 failed, continuing: Table 'CustomerInfo' doesn't exist";
    assert!(report.lines().iter().any(|l| l == expected));
}

#[tokio::test]
async fn test_unreachable_store_fails_run_with_single_line() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    warehouse.disconnect();

    let report = run(&db1, &db2, &warehouse).await;

    assert!(!report.completed);
    assert_eq!(
        report.lines(),
        vec!["❌ Connection to warehouse failed: MySQL server has gone away"]
    );
    assert!(warehouse.statements().is_empty());
    assert!(db1.statements().is_empty());
}

#[tokio::test]
async fn test_source_outage_is_detected_before_any_reset() {
    let (db1, db2, warehouse) = (db1(), db2(), MemoryConnection::new("warehouse"));
    run(&db1, &db2, &warehouse).await;
    db2.disconnect();

    let report = run(&db1, &db2, &warehouse).await;

    assert_eq!(report.failures(), 1);
    assert_eq!(
        report.lines(),
        vec!["❌ Connection to db2 failed: MySQL server has gone away"]
    );
    // previous load left untouched
    assert_eq!(warehouse.rows(FACT_SALES).len(), 4);
}
