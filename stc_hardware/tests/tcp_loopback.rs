use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use rstest::rstest;
use stc_hardware::{HwError, TcpRegisterBus, modbus};
use stc_traits::RegisterBus;

/// Accept one connection and answer each request with `respond(request_pdu)`.
fn serve<F>(requests: usize, respond: F) -> u16
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        for _ in 0..requests {
            let mut head = [0u8; modbus::MBAP_LEN];
            if sock.read_exact(&mut head).is_err() {
                return;
            }
            let h = modbus::parse_header(&head).unwrap();
            let mut pdu = vec![0u8; h.pdu_len()];
            sock.read_exact(&mut pdu).unwrap();
            let Some(reply) = respond(&pdu) else {
                // hold the socket open without answering
                thread::sleep(Duration::from_millis(300));
                return;
            };
            let mut out = Vec::new();
            out.extend_from_slice(&h.transaction_id.to_be_bytes());
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
            out.push(h.unit_id);
            out.extend_from_slice(&reply);
            sock.write_all(&out).unwrap();
        }
    });
    port
}

#[test]
fn reads_holding_registers_over_tcp() {
    let port = serve(1, |pdu| {
        assert_eq!(pdu, &[0x03, 0, 100, 0, 2]);
        Some(vec![0x03, 4, 0, 72, 0, 74])
    });
    let mut bus = TcpRegisterBus::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
    let words = bus
        .read_holding(1, 100, 2, Duration::from_secs(1))
        .unwrap();
    assert_eq!(words, vec![72, 74]);
}

#[test]
fn write_then_coil_on_one_connection() {
    let port = serve(2, |pdu| match pdu[0] {
        0x10 => Some(pdu[..5].to_vec()),
        0x05 => Some(pdu.to_vec()),
        _ => None,
    });
    let mut bus = TcpRegisterBus::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
    bus.write_registers(1, 220, &[80, 75, 70], Duration::from_secs(1))
        .unwrap();
    bus.write_coil(1, 10, true, Duration::from_secs(1)).unwrap();
}

#[rstest]
#[case(0x01)]
#[case(0x02)]
#[case(0x04)]
fn device_exception_is_reported(#[case] code: u8) {
    let port = serve(1, move |_| Some(vec![0x90, code]));
    let mut bus = TcpRegisterBus::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
    let err = bus
        .write_registers(1, 220, &[1], Duration::from_secs(1))
        .unwrap_err();
    let hw = err.downcast_ref::<HwError>().unwrap();
    assert!(matches!(hw, HwError::Exception { function: 0x10, code: c } if *c == code));
}

#[test]
fn silent_controller_times_out() {
    let port = serve(1, |_| None);
    let mut bus = TcpRegisterBus::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
    let err = bus
        .read_holding(1, 100, 8, Duration::from_millis(50))
        .unwrap_err();
    let hw = err.downcast_ref::<HwError>().unwrap();
    assert!(matches!(hw, HwError::Timeout), "got {hw:?}");
}

#[test]
fn refused_connection_is_a_connect_error() {
    // bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = TcpRegisterBus::connect("127.0.0.1", port, Duration::from_millis(200))
        .err()
        .unwrap();
    assert!(matches!(err, HwError::Connect { .. }));
}
