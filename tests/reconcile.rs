use estimate_tables::Session;
use estimate_tables::address;
use estimate_tables::backend::{MemoryWorkbook, SpreadsheetBackend};
use estimate_tables::config::Settings;
use estimate_tables::error::{ReconcileStep, TableError};
use estimate_tables::model::{CellValue, GridRange, Rectangle, SheetId, TextFormatRun};
use estimate_tables::records::{FormulaCell, Member, RowMap};

fn range(start_row: u32, end_row: u32, start_col: u32, end_col: u32) -> GridRange {
    Rectangle::new(start_row, end_row, start_col, end_col)
        .expect("valid rectangle")
        .into()
}

fn member(name: &str) -> Member {
    Member {
        display_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
    }
}

/// Members table with `existing` data rows at A1, a footer line one blank row
/// below it, and a Tasks table further down the same sheet.
fn members_workbook(existing: u32) -> (MemoryWorkbook, SheetId) {
    let mut workbook = MemoryWorkbook::new();
    let sheet = workbook.add_sheet("Members");

    let mut rows = vec![vec![
        Member::DISPLAY_NAME.to_string(),
        Member::EMAIL.to_string(),
        "合計".to_string(),
    ]];
    for idx in 0..existing {
        rows.push(vec![format!("old{idx}"), format!("old{idx}@example.com"), "1".into()]);
    }
    workbook.set_values(sheet, 0, 0, &rows).expect("members written");
    workbook
        .add_table(sheet, "Members", "tbl-members", range(0, existing + 1, 0, 3))
        .expect("members declared");

    let footer_row = existing + 2;
    workbook
        .set_values(sheet, footer_row, 0, &[vec!["footer"]])
        .expect("footer written");

    let tasks_row = footer_row + 2;
    workbook
        .set_values(sheet, tasks_row, 0, &[vec!["Task", "Points"], vec!["Design", "3"]])
        .expect("tasks written");
    workbook
        .add_table(sheet, "Tasks", "tbl-tasks", range(tasks_row, tasks_row + 2, 0, 2))
        .expect("tasks declared");

    (workbook, sheet)
}

fn session(workbook: MemoryWorkbook) -> Session<MemoryWorkbook> {
    Session::new(workbook, Settings::default())
}

fn find_row(workbook: &MemoryWorkbook, text: &str) -> Option<u32> {
    let sheet = workbook.sheet("Members").expect("sheet exists");
    (0..sheet.row_count() as u32).find(|row| {
        sheet
            .cell(*row, 0)
            .map(|cell| cell.text() == text)
            .unwrap_or(false)
    })
}

#[test]
fn write_records_replaces_existing_rows() {
    let (workbook, _) = members_workbook(3);
    let mut session = session(workbook);
    let records: Vec<Member> = ["Aki", "Ben", "Chika", "Dai", "Emi"]
        .into_iter()
        .map(member)
        .collect();

    let updated = session
        .write_records("Members", &records, &[])
        .expect("records written");

    assert_eq!(updated.rectangle, Rectangle::new(0, 6, 0, 3).unwrap());
    let reread: Vec<Member> = session.load_records("Members").expect("records read");
    assert_eq!(reread, records);
    assert_eq!(reread[0], records[0]);

    let workbook = session.into_backend();
    for idx in 0..3 {
        assert_eq!(find_row(&workbook, &format!("old{idx}")), None);
    }
    assert_eq!(find_row(&workbook, "footer"), Some(7));
}

#[test]
fn untracked_columns_are_cleared_unless_a_formula_targets_them() {
    let (workbook, _) = members_workbook(2);
    let mut session = session(workbook);
    let records = vec![member("Aki"), member("Ben")];
    let formulas = vec![FormulaCell {
        row: 1,
        column: "合計".into(),
        formula: "=COUNTA(A2:A3)".into(),
    }];

    session
        .write_records("Members", &records, &formulas)
        .expect("records written");

    let workbook = session.into_backend();
    let sheet = workbook.sheet("Members").unwrap();
    assert_eq!(sheet.cell(1, 2).unwrap().value, Some(CellValue::empty()));
    assert_eq!(
        sheet.cell(2, 2).unwrap().value,
        Some(CellValue::Formula("=COUNTA(A2:A3)".into()))
    );
}

#[test]
fn formula_outside_written_rows_aborts_before_mutating() {
    let (workbook, _) = members_workbook(3);
    let mut session = session(workbook);
    let formulas = vec![FormulaCell {
        row: 5,
        column: "合計".into(),
        formula: "=1".into(),
    }];

    let error = session
        .write_records("Members", &[member("Aki")], &formulas)
        .expect_err("formula row out of range");
    assert!(matches!(error, TableError::InvalidRecord(_)));

    session.refresh_tables();
    let table = session.get_table("Members").unwrap();
    assert_eq!(table.data_row_count(), 3);
}

#[test]
fn reconcile_to_zero_leaves_header_only() {
    let (workbook, _) = members_workbook(4);
    let mut session = session(workbook);
    let table = session.get_table("Members").unwrap();

    let updated = session.reconcile(&table, 0).expect("reconciled");
    assert_eq!(updated.rectangle, Rectangle::new(0, 1, 0, 3).unwrap());

    let rows = session.read_rows("Members").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Member::DISPLAY_NAME);

    // The blank spacer row now sits directly under the header.
    let workbook = session.into_backend();
    assert_eq!(find_row(&workbook, "footer"), Some(2));
}

#[test]
fn reconcile_reaches_target_from_any_row_count() {
    for current in 0..4u32 {
        for target in 0..4u32 {
            let (workbook, _) = members_workbook(current);
            let mut session = session(workbook);
            let table = session.get_table("Members").unwrap();
            let tasks_before = session.get_table("Tasks").unwrap().rectangle;

            let updated = session.reconcile(&table, target).expect("reconciled");
            assert_eq!(updated.rectangle.row_count(), target + 1, "{current} -> {target}");

            session.refresh_tables();
            let reloaded = session.get_table("Members").unwrap();
            assert_eq!(reloaded, updated, "{current} -> {target}");

            let tasks_after = session.get_table("Tasks").unwrap().rectangle;
            assert_eq!(
                tasks_after.start_row() as i64 - tasks_before.start_row() as i64,
                target as i64 - current as i64
            );
            assert_eq!(tasks_after.row_count(), tasks_before.row_count());

            let data = session.read_rows("Members").unwrap();
            assert_eq!(data.len() as u32, target + 1);
            assert!(data[1..].iter().flatten().all(String::is_empty));
        }
    }
}

#[test]
fn reconcile_is_idempotent_with_re_resolution() {
    let (workbook, _) = members_workbook(3);
    let mut session = session(workbook);

    let first = {
        let table = session.get_table("Members").unwrap();
        session.reconcile(&table, 2).unwrap()
    };
    session.refresh_tables();
    let second = {
        let table = session.get_table("Members").unwrap();
        session.reconcile(&table, 2).unwrap()
    };

    assert_eq!(first, second);
    let workbook = session.into_backend();
    assert_eq!(find_row(&workbook, "footer"), Some(4));
}

#[test]
fn failed_step_is_reported_and_left_applied() {
    let (mut workbook, _) = members_workbook(3);
    workbook.reject_ops("delete_rows");
    let mut session = session(workbook);
    let table = session.get_table("Members").unwrap();

    let error = session.reconcile(&table, 2).expect_err("delete rejected");
    match error {
        TableError::StructuralMutationFailed { table, step, .. } => {
            assert_eq!(table, "Members");
            assert_eq!(step, ReconcileStep::DeleteRows);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The insert went through and widened the declared table.
    session.refresh_tables();
    let partial = session.get_table("Members").unwrap();
    assert_eq!(partial.data_row_count(), 5);
}

#[test]
fn unknown_table_and_header_are_fatal() {
    let (workbook, _) = members_workbook(1);
    let mut session = session(workbook);

    assert!(matches!(
        session.get_table("DoesNotExist"),
        Err(TableError::TableNotFound(name)) if name == "DoesNotExist"
    ));

    let mut row = RowMap::new();
    row.insert("電話番号".into(), "000".into());
    let error = session
        .write_maps("Members", &[row], &[])
        .expect_err("unknown header");
    assert!(matches!(
        error,
        TableError::HeaderNotFound { ref table, ref column } if table == "Members" && column == "電話番号"
    ));
}

#[test]
fn header_offsets_follow_the_table_not_the_sheet() {
    let mut workbook = MemoryWorkbook::new();
    let sheet = workbook.add_sheet("見積もり");
    workbook
        .set_values(sheet, 2, 3, &[vec!["項目", "工数"], vec!["設計", "5"]])
        .unwrap();
    workbook
        .add_table(sheet, "Estimates", "tbl-est", range(2, 4, 3, 5))
        .unwrap();
    let mut session = session(workbook);

    let headers = session.headers("Estimates").unwrap();
    assert_eq!(headers.offset("工数").unwrap(), 1);

    let maps = session.load_maps("Estimates").unwrap();
    assert_eq!(maps[0]["項目"], "設計");

    let table = session.get_table("Estimates").unwrap();
    assert_eq!(address::to_address(&table.rectangle, &table.sheet_title), "見積もり!D3:E4");
}

#[test]
fn rich_text_is_stored_with_its_runs() {
    let (workbook, sheet) = members_workbook(0);
    let mut session = session(workbook);
    let cell = Rectangle::new(10, 11, 0, 1).unwrap();
    let runs = vec![TextFormatRun {
        start_index: 5,
        bold: false,
        link: Some("https://example.com/form".into()),
    }];

    session
        .write_rich_text(sheet, cell, "Form: link", runs.clone())
        .expect("rich text written");

    let stored = session.backend().sheet("Members").unwrap().cell(10, 0).unwrap().clone();
    assert_eq!(stored.text(), "Form: link");
    assert_eq!(stored.runs, runs);
    assert_eq!(
        session.backend().read_range("Members!A11").unwrap(),
        vec![vec!["Form: link".to_string()]]
    );
}

#[test]
fn oversized_targets_fail_without_touching_the_sheet() {
    let (workbook, _) = members_workbook(0);
    let mut session = session(workbook);
    let table = session.get_table("Members").unwrap();

    let error = session.reconcile(&table, u32::MAX).expect_err("row index overflows");
    assert!(matches!(error, TableError::RowLimitExceeded { target, .. } if target == u32::MAX));

    // Fits in a u32 but not on a sheet: the insert itself is refused.
    let error = session.reconcile(&table, 2_000_000).expect_err("sheet too small");
    assert!(matches!(
        error,
        TableError::StructuralMutationFailed { step: ReconcileStep::InsertRows, .. }
    ));

    session.refresh_tables();
    assert_eq!(session.get_table("Members").unwrap(), table);
    let workbook = session.into_backend();
    assert_eq!(find_row(&workbook, "footer"), Some(2));
}
