use std::str::FromStr;
use std::sync::Arc;

use blocking_tx_driver::prelude::*;
use blocking_tx_driver::test_utils::{Event, MemoryTransport};
use chrono::{FixedOffset, NaiveDate, TimeZone};
use rust_decimal::Decimal;

fn connection(
    tables: &[(&str, Vec<ColumnMetadata>)],
) -> Result<(Arc<MemoryTransport>, Connection), DriverError> {
    let transport = Arc::new(MemoryTransport::new());
    for (name, columns) in tables {
        transport.create_table(name, columns.clone());
    }
    let conn = Connection::open(transport.clone(), ConnectionConfig::default())?;
    Ok((transport, conn))
}

fn items() -> (&'static str, Vec<ColumnMetadata>) {
    (
        "items",
        vec![
            ColumnMetadata::new("id", AtomType::Int8),
            ColumnMetadata::new("name", AtomType::Character),
        ],
    )
}

fn prepare_count(transport: &MemoryTransport) -> usize {
    transport.count(|e| matches!(e, Event::Prepare { .. }))
}

#[test]
fn bound_values_are_written() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;
    insert.set(1, 7_i64)?;
    insert.set(2, "pear")?;
    assert_eq!(insert.execute_update()?, 1);

    assert_eq!(
        transport.committed_rows("items"),
        vec![vec![WireValue::Int8(7), WireValue::Character("pear".into())]]
    );
    assert_eq!(prepare_count(&transport), 1);
    assert!(transport.events().iter().any(|e| matches!(
        e,
        Event::Prepare { placeholders, .. }
            if *placeholders == [AtomType::Int8, AtomType::Character]
    )));
    Ok(())
}

#[test]
fn retyping_a_position_prepares_again() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;

    insert.set(1, 1_i64)?;
    insert.set(2, "a")?;
    insert.execute_update()?;
    insert.set(1, 2_i64)?;
    insert.execute_update()?;
    assert_eq!(prepare_count(&transport), 1);

    insert.set(1, 3_i32)?;
    insert.execute_update()?;
    assert_eq!(prepare_count(&transport), 2);
    assert_eq!(
        transport.count(|e| matches!(e, Event::DisposePrepared { .. })),
        1
    );
    let placeholders: Vec<Vec<AtomType>> = transport
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Prepare { placeholders, .. } => Some(placeholders),
            _ => None,
        })
        .collect();
    assert_eq!(
        placeholders,
        vec![
            vec![AtomType::Int8, AtomType::Character],
            vec![AtomType::Int4, AtomType::Character],
        ]
    );

    insert.close();
    assert_eq!(transport.prepared_count(), 0);
    Ok(())
}

#[test]
fn null_keeps_the_established_type() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;

    insert.set(1, 1_i64)?;
    insert.set(2, "named")?;
    insert.execute_update()?;
    insert.set(1, 2_i64)?;
    insert.set(2, HostValue::Null)?;
    insert.execute_update()?;
    assert_eq!(prepare_count(&transport), 1);

    let rows = transport.committed_rows("items");
    assert_eq!(rows[1], vec![WireValue::Int8(2), WireValue::Null]);

    let mut fresh = conn.prepare_statement("insert into items")?;
    assert!(matches!(
        fresh.set(1, HostValue::Null),
        Err(DriverError::Parameter(_))
    ));
    fresh.set_null(1, AtomType::Int8)?;
    fresh.set(2, Some("late"))?;
    fresh.execute_update()?;
    assert_eq!(rows.len() + 1, transport.committed_rows("items").len());
    Ok(())
}

#[test]
fn unset_positions_are_reported() -> Result<(), Box<dyn std::error::Error>> {
    let (_transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;
    insert.set(2, "orphan")?;
    let err = insert.execute_update().unwrap_err();
    assert!(matches!(err, DriverError::Parameter(ref m) if m.contains("parameter 1")));

    insert.set(1, 1_i64)?;
    insert.clear_parameters();
    assert!(matches!(
        insert.execute_update(),
        Err(DriverError::Parameter(_))
    ));
    assert!(matches!(insert.set(0, 1_i64), Err(DriverError::Parameter(_))));
    Ok(())
}

#[test]
fn declared_type_converts_the_value() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;
    insert.set_typed(1, "42", AtomType::Int8)?;
    insert.set_typed(2, 3.5_f64, AtomType::Character)?;
    insert.execute_update()?;
    assert_eq!(
        transport.committed_rows("items"),
        vec![vec![WireValue::Int8(42), WireValue::Character("3.5".into())]]
    );

    insert.set_typed(1, "forty-two", AtomType::Int8)?;
    assert!(matches!(
        insert.execute_update(),
        Err(DriverError::MalformedLiteralConversion { .. })
    ));
    Ok(())
}

#[test]
fn batch_runs_in_one_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    let mut insert = conn.prepare_statement("insert into items")?;
    for (id, name) in [(1_i64, "a"), (2, "b"), (3, "c")] {
        insert.set(1, id)?;
        insert.set(2, name)?;
        insert.add_batch()?;
    }
    assert_eq!(insert.execute_batch()?, vec![1, 1, 1]);
    assert_eq!(transport.committed_rows("items").len(), 3);
    assert_eq!(transport.count(|e| matches!(e, Event::Begin { .. })), 1);
    assert_eq!(transport.count(|e| matches!(e, Event::Commit { .. })), 1);

    insert.set(1, 4_i64)?;
    insert.add_batch()?;
    insert.set(1, 5_i32)?;
    assert!(matches!(insert.add_batch(), Err(DriverError::Parameter(_))));
    insert.clear_batch();
    assert!(insert.execute_batch()?.is_empty());
    Ok(())
}

#[test]
fn prepared_query_keeps_its_statement() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = connection(&[items()])?;
    transport.seed_row("items", vec![WireValue::Int8(1), WireValue::Character("a".into())]);
    let mut select = conn.prepare_statement("select * from items")?;

    for _ in 0..2 {
        let mut cursor = select.execute_query()?;
        assert!(cursor.advance()?);
        assert!(!cursor.advance()?);
    }
    assert_eq!(prepare_count(&transport), 1);
    assert_eq!(
        transport.count(|e| matches!(e, Event::DisposePrepared { .. })),
        0
    );

    drop(select);
    assert_eq!(transport.prepared_count(), 0);
    Ok(())
}

#[test]
fn values_round_trip_through_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let columns = vec![
        ColumnMetadata::new("i", AtomType::Int4),
        ColumnMetadata::new("l", AtomType::Int8),
        ColumnMetadata::new("d", AtomType::Float8),
        ColumnMetadata::new("s", AtomType::Character),
        ColumnMetadata::new("day", AtomType::Date),
        ColumnMetadata::new("at", AtomType::TimePoint),
        ColumnMetadata::new("at_tz", AtomType::TimePointWithTimeZone),
        ColumnMetadata::new("amount", AtomType::Decimal).with_scale(2),
    ];
    let (_transport, conn) = connection(&[("kinds", columns)])?;

    let day = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
    let at = day.and_hms_milli_opt(23, 59, 58, 125).expect("time");
    let at_tz = FixedOffset::east_opt(-5 * 3600)
        .expect("offset")
        .from_local_datetime(&at)
        .single()
        .expect("instant");
    let values = vec![
        (HostValue::Int(-17), TargetKind::Int),
        (HostValue::Long(9_007_199_254_740_993), TargetKind::Long),
        (HostValue::Double(0.1), TargetKind::Double),
        (HostValue::String("naïve".into()), TargetKind::String),
        (HostValue::LocalDate(day), TargetKind::LocalDate),
        (HostValue::LocalDateTime(at), TargetKind::LocalDateTime),
        (HostValue::OffsetDateTime(at_tz), TargetKind::OffsetDateTime),
    ];

    let mut insert = conn.prepare_statement("insert into kinds")?;
    for (i, (value, _)) in values.iter().enumerate() {
        insert.set(i + 1, value.clone())?;
    }
    insert.set(8, Decimal::from_str("12.5")?)?;
    insert.execute_update()?;

    let mut cursor = conn.create_statement()?.execute_query("select * from kinds")?;
    assert!(cursor.advance()?);
    for (i, (value, target)) in values.iter().enumerate() {
        assert_eq!(&cursor.get(i + 1, *target)?, value, "column {}", i + 1);
    }
    assert_eq!(
        cursor.get_decimal_with_scale(8, 2)?,
        Some(Decimal::from_str("12.50")?)
    );
    assert_eq!(
        cursor
            .get(8, TargetKind::Decimal)?
            .as_decimal()
            .map(|d| d.to_string()),
        Some("12.50".to_string())
    );
    Ok(())
}
