use serial_test::serial;
use tiny_db::{utils::HandyRwLock, Transaction};

mod test_utils;
use test_utils::{
    insert_id_name, insert_row, int_string_schema, look_for, new_int_string_table, new_int_table,
    reopen_table, run_checkpoint, run_recovery, scan_id_name, setup, simulate_crash, wal_path,
};

#[test]
#[serial]
fn test_commit_survives_crash() {
    setup();

    {
        let table_pod = new_int_string_table("recover_commit");
        let table = table_pod.rl();

        let tx = Transaction::new();
        tx.start().unwrap();
        insert_id_name(&table, &tx, 1, "a");
        tx.commit().unwrap();
    }

    simulate_crash();

    let table_pod = reopen_table("recover_commit", &int_string_schema());
    let table = table_pod.rl();
    run_recovery();

    let tx = Transaction::new();
    tx.start().unwrap();
    assert_eq!(scan_id_name(&table, &tx), vec![(1, "a".to_string())]);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_loser_without_flush_disappears() {
    setup();

    {
        let table_pod = new_int_string_table("recover_loser");
        let table = table_pod.rl();

        let tx_1 = Transaction::new();
        tx_1.start().unwrap();
        insert_id_name(&table, &tx_1, 1, "a");
        tx_1.commit().unwrap();

        // tx_2 never completes; NO STEAL keeps its page off disk
        let tx_2 = Transaction::new();
        tx_2.start().unwrap();
        insert_id_name(&table, &tx_2, 2, "b");
    }

    simulate_crash();

    let table_pod = reopen_table("recover_loser", &int_string_schema());
    let table = table_pod.rl();
    run_recovery();

    let tx = Transaction::new();
    tx.start().unwrap();
    assert_eq!(scan_id_name(&table, &tx), vec![(1, "a".to_string())]);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_loser_stolen_by_checkpoint_is_undone() {
    setup();

    {
        let table_pod = new_int_string_table("recover_stolen");
        let table = table_pod.rl();

        let tx_1 = Transaction::new();
        tx_1.start().unwrap();
        insert_id_name(&table, &tx_1, 1, "a");
        tx_1.commit().unwrap();

        // the checkpoint writes tx_2's dirty page to disk and records
        // tx_2 as active; recovery must undo it from the before image
        let tx_2 = Transaction::new();
        tx_2.start().unwrap();
        insert_id_name(&table, &tx_2, 2, "b");
        run_checkpoint();
    }

    simulate_crash();

    let table_pod = reopen_table("recover_stolen", &int_string_schema());
    let table = table_pod.rl();

    // before recovery the stolen page really is on disk; read it
    // directly so the log stays untouched
    {
        let pid = tiny_db::HeapPageID::new(table.get_id(), 0);
        let page = table.read_page(&pid).unwrap();
        let names: Vec<String> = page
            .iter()
            .map(|t| t.get_cell(1).get_string().unwrap())
            .collect();
        assert!(names.contains(&"b".to_string()));
    }

    run_recovery();

    let tx = Transaction::new();
    tx.start().unwrap();
    assert_eq!(scan_id_name(&table, &tx), vec![(1, "a".to_string())]);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_recover_twice_is_idempotent() {
    setup();

    {
        let table_pod = new_int_string_table("recover_idempotent");
        let table = table_pod.rl();

        let tx = Transaction::new();
        tx.start().unwrap();
        insert_id_name(&table, &tx, 1, "a");
        insert_id_name(&table, &tx, 2, "b");
        tx.commit().unwrap();

        let tx_2 = Transaction::new();
        tx_2.start().unwrap();
        insert_id_name(&table, &tx_2, 3, "c");
    }

    simulate_crash();

    let table_pod = reopen_table("recover_idempotent", &int_string_schema());
    let table = table_pod.rl();

    run_recovery();
    let tx = Transaction::new();
    tx.start().unwrap();
    let first = scan_id_name(&table, &tx);
    tx.commit().unwrap();

    run_recovery();
    let tx = Transaction::new();
    tx.start().unwrap();
    let second = scan_id_name(&table, &tx);
    tx.commit().unwrap();

    assert_eq!(first, second);
    assert_eq!(first, vec![(1, "a".to_string()), (2, "b".to_string())]);
}

#[test]
#[serial]
fn test_checkpoint_truncates_log() {
    setup();

    let table_pod = new_int_table("recover_truncate", 2);
    let table = table_pod.rl();

    // three committed transactions, each logging full page images
    for round in 0..3i64 {
        let tx = Transaction::new();
        tx.start().unwrap();
        for key in 0..4 {
            insert_row(&table, &tx, round * 10 + key);
        }
        tx.commit().unwrap();
    }

    let len_before = std::fs::metadata(wal_path()).unwrap().len();
    run_checkpoint();
    let len_after = std::fs::metadata(wal_path()).unwrap().len();
    assert!(
        len_after < len_before,
        "log did not shrink: {} -> {}",
        len_before,
        len_after
    );

    // the truncated log still recovers to the committed state
    drop(table);
    simulate_crash();
    let table_pod = reopen_table("recover_truncate", &tiny_db::Schema::small_int(2));
    let table = table_pod.rl();
    run_recovery();

    let tx = Transaction::new();
    tx.start().unwrap();
    assert_eq!(table.tuples_count(&tx).unwrap(), 12);
    for round in 0..3i64 {
        for key in 0..4 {
            assert_eq!(look_for(&table, &tx, round * 10 + key), 1);
        }
    }
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_truncate_keeps_live_transaction_history() {
    setup();

    {
        let table_pod = new_int_string_table("recover_live_truncate");
        let table = table_pod.rl();

        let tx_1 = Transaction::new();
        tx_1.start().unwrap();
        insert_id_name(&table, &tx_1, 1, "a");
        tx_1.commit().unwrap();

        // tx_2 is live across the checkpoint: truncation must keep its
        // records so the post-crash undo can find the before image
        let tx_2 = Transaction::new();
        tx_2.start().unwrap();
        insert_id_name(&table, &tx_2, 2, "b");
        run_checkpoint();

        insert_id_name(&table, &tx_2, 3, "c");
    }

    simulate_crash();

    let table_pod = reopen_table("recover_live_truncate", &int_string_schema());
    let table = table_pod.rl();
    run_recovery();

    let tx = Transaction::new();
    tx.start().unwrap();
    assert_eq!(scan_id_name(&table, &tx), vec![(1, "a".to_string())]);
    tx.commit().unwrap();
}
