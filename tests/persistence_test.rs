#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: submit an expense that waits for a manager
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "action, actor, role, expense, amount, description, receipt, notes").unwrap();
    writeln!(csv1, "submit, 1, employee, , 2000000, Laptop, , ").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("expense-settlement"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,1,2000000,pending,true,false,pending,,,false,"));

    // 2. Second run: reject it and submit another one against the same DB
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "action, actor, role, expense, amount, description, receipt, notes").unwrap();
    writeln!(csv2, "reject, 99, manager, 1, , , , duplicate").unwrap();
    writeln!(csv2, "submit, 2, employee, , 3000000, Hotel, , ").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("expense-settlement"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // The recovered expense was decided and ids continue where they left off
    assert!(stdout2.contains("1,1,2000000,rejected,true,false,rejected,99,duplicate,false,"));
    assert!(stdout2.contains("2,2,3000000,pending,true,false,pending,,,false,"));
}
