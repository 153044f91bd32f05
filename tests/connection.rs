//! Integration tests driving a fake MySQL peer over `tokio::io::duplex`.
//! The teacher's own integration tests assume a live `mysqld` on
//! `localhost`; these exercise the same handshake/query/result-set flow
//! against a hand-built in-process peer instead, since the crate as built
//! here has no server to dial in a test environment.

use cmysql::{Connection, Error, Opts, QueryOutcome, Value};

fn small_packet(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    out[..3].copy_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    out[3] = sequence_id;
    out.extend_from_slice(payload);
    out
}

fn initial_handshake_packet() -> Vec<u8> {
    let mut payload = vec![10u8];
    payload.extend_from_slice(b"8.0.33\0");
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(b"AAAAAAAA");
    payload.push(0);
    payload.extend_from_slice(&0x0200u16.to_le_bytes()); // CLIENT_PROTOCOL_41
    payload.push(33);
    payload.extend_from_slice(&2u16.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.push(21);
    payload.extend_from_slice(&[0u8; 10]);
    payload.extend_from_slice(b"BBBBBBBBBBBB");
    payload.push(0);
    payload.extend_from_slice(b"mysql_native_password\0");
    small_packet(0, &payload)
}

fn ok_payload() -> Vec<u8> {
    let mut payload = vec![0x00, 0, 0];
    payload.extend_from_slice(&2u16.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

fn lenenc_str(s: &[u8]) -> Vec<u8> {
    let mut out = vec![s.len() as u8];
    out.extend_from_slice(s);
    out
}

fn field_packet(name: &[u8], column_type: u8) -> Vec<u8> {
    let mut field = Vec::new();
    field.extend(lenenc_str(b"def"));
    field.extend(lenenc_str(b""));
    field.extend(lenenc_str(b""));
    field.extend(lenenc_str(b""));
    field.extend(lenenc_str(name));
    field.extend(lenenc_str(name));
    field.push(0x0c);
    field.extend_from_slice(&33u16.to_le_bytes());
    field.extend_from_slice(&0u32.to_le_bytes());
    field.push(column_type);
    field.extend_from_slice(&0u16.to_le_bytes());
    field.push(0);
    field.extend_from_slice(&0u16.to_le_bytes());
    field
}

fn eof_packet_payload() -> Vec<u8> {
    vec![0xFE, 0, 0, 2, 0]
}

/// Drain one client-written packet (header + body) from the server side.
async fn drain_one_packet(server: &mut tokio::io::DuplexStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    tokio::io::AsyncReadExt::read_exact(server, &mut header)
        .await
        .unwrap();
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut body = vec![0u8; len];
    tokio::io::AsyncReadExt::read_exact(server, &mut body).await.unwrap();
    body
}

async fn handshaken_pair() -> (Connection<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
    let (client, mut server) = tokio::io::duplex(1 << 16);
    let server_task = tokio::spawn(async move {
        tokio::io::AsyncWriteExt::write_all(&mut server, &initial_handshake_packet())
            .await
            .unwrap();
        drain_one_packet(&mut server).await;
        let ok = small_packet(2, &ok_payload());
        tokio::io::AsyncWriteExt::write_all(&mut server, &ok).await.unwrap();
        server
    });

    let opts = Opts {
        user: "root".into(),
        ..Opts::default()
    };
    let connection = Connection::handshake(client, &opts).await.unwrap();
    let server = server_task.await.unwrap();
    (connection, server)
}

#[tokio::test]
async fn select_1_round_trips_through_the_public_api() {
    let (mut connection, mut server) = handshaken_pair().await;

    let server_task = tokio::spawn(async move {
        let body = drain_one_packet(&mut server).await;
        assert_eq!(&body[1..], b"select 1");

        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(1, &[1]))
            .await
            .unwrap();
        let field = field_packet(b"1", 0x03); // MYSQL_TYPE_LONG
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(2, &field))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(3, &eof_packet_payload()))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(4, &[1, b'1']))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(5, &eof_packet_payload()))
            .await
            .unwrap();
        server
    });

    let QueryOutcome::Rows(mut rows) = connection.query("select 1").await.unwrap() else {
        panic!("expected a result set for a SELECT");
    };
    let row = rows.next().await.unwrap().unwrap();
    assert_eq!(row, vec![Value::Int(1)]);
    assert!(rows.next().await.unwrap().is_none());
    rows.close().await.unwrap();

    server_task.await.unwrap();
}

#[tokio::test]
async fn closing_a_result_set_before_end_of_stream_is_a_programming_error() {
    let (mut connection, mut server) = handshaken_pair().await;

    let server_task = tokio::spawn(async move {
        drain_one_packet(&mut server).await;
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(1, &[1]))
            .await
            .unwrap();
        let field = field_packet(b"1", 0x03);
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(2, &field))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(3, &eof_packet_payload()))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(4, &[1, b'1']))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(5, &eof_packet_payload()))
            .await
            .unwrap();
        server
    });

    let QueryOutcome::Rows(rows) = connection.query("select 1").await.unwrap() else {
        panic!("expected a result set for a SELECT");
    };
    let err = rows.close().await.unwrap_err();
    assert!(matches!(err, Error::Programming(_)));

    server_task.await.unwrap();
}

#[tokio::test]
async fn zero_date_decodes_to_null() {
    let (mut connection, mut server) = handshaken_pair().await;

    let server_task = tokio::spawn(async move {
        drain_one_packet(&mut server).await;
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(1, &[1]))
            .await
            .unwrap();
        let field = field_packet(b"d", 0x0a); // MYSQL_TYPE_DATE
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(2, &field))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(3, &eof_packet_payload()))
            .await
            .unwrap();

        let row = lenenc_str(b"0000-00-00");
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(4, &row))
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(5, &eof_packet_payload()))
            .await
            .unwrap();
        server
    });

    let QueryOutcome::Rows(mut rows) = connection.query("select d").await.unwrap() else {
        panic!("expected a result set for a SELECT");
    };
    let row = rows.next().await.unwrap().unwrap();
    assert_eq!(row, vec![Value::Null]);
    assert!(rows.next().await.unwrap().is_none());
    rows.close().await.unwrap();

    server_task.await.unwrap();
}
