#[cfg(test)]
mod tests {
    use memstat_config::Scenario;
    use memstat_core::itm::{TraceConfig, TraceRegister, TraceSink};
    use memstat_core::{ByteSink, MemoryBus};

    use crate::board::{Board, Channel, ReportKind, TRACE_UNIT};
    use crate::bus::SystemBus;
    use crate::decode::{self, DecodeError, Record, StackUsage};
    use crate::memory::LinearMemory;
    use crate::peripherals::trace::{PPB_BASE, PPB_SIZE};
    use crate::peripherals::{Pl011Model, TraceUnit};
    use crate::{Peripheral, SimError};

    const SCENARIO: &str = r#"
schema_version: "1.0"
name: "board"
trace:
  core_clock_hz: 64000000
serial:
  uart_clock_hz: 16000000
memory:
  ram: { base: 0x20000000, size: "64KiB" }
  heap: { base: 0x20000000, size: 4096 }
  isr_stack: { base: 0x20001000, size: "1KiB" }
heap_stats: { max_size: 0x200, alloc_count: 10, alloc_fail_count: 0 }
threads:
  - { id: 1, stack_base: 0x20002000, stack_size: "2KiB", used: 0x1a0, entry: 0x08000401 }
  - { id: 2, stack_base: 0x20003000, stack_size: 512, used: 0x40, entry: 0x08000801 }
"#;

    const HEAP_LINE: &str = "     heap ( start: 20000000 end: 20001000 size: 00001000 used: 00000200 )  alloc ( ok: 0000000A  fail: 00000000 )\r\n";
    const ISR_LINE: &str = "isr_stack ( start: 20001000 end: 20001400 size: 00000400 )\r\n";
    const THREAD_1: &str = "    stack ( start: 20002000 end: 20002800 size: 00000800 used: 000001A0 ) thread ( id: 00000001 entry: 08000401 )\r\n";
    const THREAD_2: &str = "    stack ( start: 20003000 end: 20003200 size: 00000200 used: 00000040 ) thread ( id: 00000002 entry: 08000801 )\r\n";

    fn board(yaml: &str) -> Board {
        let scenario = Scenario::from_yaml(yaml).unwrap();
        Board::from_scenario(&scenario).unwrap()
    }

    fn with_canary(canary: &str) -> String {
        SCENARIO.replace(
            "  isr_stack: { base: 0x20001000, size: \"1KiB\" }\n",
            &format!("  isr_stack: {{ base: 0x20001000, size: \"1KiB\" }}\n  isr_canary: {}\n", canary),
        )
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_itm_heap_report() {
        let mut board = board(SCENARIO);
        let capture = board.run(Channel::Itm, ReportKind::Heap).unwrap();
        assert_eq!(text(&capture.bytes), format!("{}{}", HEAP_LINE, ISR_LINE));
        assert_eq!(capture.threads_printed, 0);
        board.check_faults().unwrap();
    }

    #[test]
    fn test_itm_enable_sequence() {
        let mut board = board(SCENARIO);
        board.run(Channel::Itm, ReportKind::All).unwrap();
        let unit = board.trace_unit().unwrap();
        assert_eq!(unit.enable_count(), 1);
        assert_eq!(unit.prescaler(), 999);
        let order: Vec<TraceRegister> = unit.writes().iter().map(|(r, _)| *r).collect();
        assert_eq!(
            order,
            vec![
                TraceRegister::Demcr,
                TraceRegister::TpiuSppr,
                TraceRegister::TpiuAcpr,
                TraceRegister::ItmLar,
                TraceRegister::ItmTcr,
                TraceRegister::ItmTpr,
                TraceRegister::ItmTer,
                TraceRegister::DwtCtrl,
                TraceRegister::TpiuFfcr,
            ]
        );
        assert_eq!(unit.dropped(), 0);
    }

    #[test]
    fn test_serial_matches_itm() {
        let mut board = board(SCENARIO);
        let itm = board.run(Channel::Itm, ReportKind::All).unwrap();
        let serial = board.run(Channel::Serial, ReportKind::All).unwrap();
        assert_eq!(itm.bytes, serial.bytes);
        assert_eq!(
            text(&serial.bytes),
            format!("{}{}{}{}", HEAP_LINE, ISR_LINE, THREAD_1, THREAD_2)
        );
        assert_eq!(serial.threads_printed, 2);

        let uart = board.uart().unwrap();
        assert_eq!(uart.init_count(), 1);
        assert_eq!(uart.divisor(), (8, 44));
        assert_eq!(board.scheduler.starts(), 2);
        assert_eq!(board.scheduler.outstanding(), 0);
    }

    #[test]
    fn test_preinitialized_serial_is_not_reconfigured() {
        let yaml = SCENARIO.replace(
            "  uart_clock_hz: 16000000\n",
            "  uart_clock_hz: 16000000\n  preinitialized: true\n",
        );
        let mut board = board(&yaml);
        let capture = board.run(Channel::Serial, ReportKind::Threads).unwrap();
        assert_eq!(text(&capture.bytes), format!("{}{}", THREAD_1, THREAD_2));
        assert_eq!(board.uart().unwrap().init_count(), 0);
    }

    #[test]
    fn test_unreachable_serial_baud() {
        let yaml = SCENARIO.replace(
            "  uart_clock_hz: 16000000\n",
            "  uart_clock_hz: 1000\n",
        );
        let mut board = board(&yaml);
        let err = board.run(Channel::Serial, ReportKind::Heap).unwrap_err();
        assert!(format!("{:#}", err).contains("not reachable"));
        assert!(board.uart().unwrap().tx().is_empty());
    }

    #[test]
    fn test_canary_usage_rendering() {
        let cases = [
            ("{ used: 128 }", " used: 00000080 )\r\n"),
            ("{ used: 0 }", " used: -------- )\r\n"),
            ("{ used: \"1KiB\" }", " used: 00000400 ! )\r\n"),
            ("{ growth: upward, used: 4 }", " used: 00000004 )\r\n"),
            ("{ used: 6 }", " used: 00000008 )\r\n"),
        ];
        for (canary, tail) in cases {
            let mut board = board(&with_canary(canary));
            let capture = board.run(Channel::Itm, ReportKind::Heap).unwrap();
            let out = text(&capture.bytes);
            let isr = out.lines().nth(1).unwrap();
            assert_eq!(
                format!("{}\r\n", isr),
                format!("isr_stack ( start: 20001000 end: 20001400 size: 00000400{}", tail),
                "canary {}",
                canary
            );
        }
    }

    #[test]
    fn test_corrupt_thread_is_skipped() {
        let yaml = SCENARIO.replace("entry: 0x08000401 }", "entry: 0x08000401, corrupt: true }");
        let mut board = board(&yaml);
        let capture = board.run(Channel::Itm, ReportKind::Threads).unwrap();
        assert_eq!(text(&capture.bytes), THREAD_2);
        assert_eq!(capture.threads_printed, 1);
        assert_eq!(board.scheduler.frees(), 1);
    }

    #[test]
    fn test_double_free_shows_as_negative_outstanding() {
        use memstat_core::Scheduler;

        let board = board(SCENARIO);
        let cursor = board.scheduler.enumerate_start();
        board.scheduler.enumerate_free(cursor);
        board.scheduler.enumerate_free(0);
        assert_eq!(board.scheduler.outstanding(), -1);
        board.check_faults().unwrap();
    }

    #[test]
    fn test_decode_board_output() {
        let mut board = board(&with_canary("{ used: 128 }"));
        let capture = board.run(Channel::Serial, ReportKind::All).unwrap();
        let records = decode::decode(&text(&capture.bytes)).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0],
            Record::Heap {
                start: 0x2000_0000,
                end: 0x2000_1000,
                size: 0x1000,
                used: 0x200,
                alloc_ok: 10,
                alloc_fail: 0,
            }
        );
        assert_eq!(
            records[1],
            Record::IsrStack {
                start: 0x2000_1000,
                end: 0x2000_1400,
                size: 0x400,
                used: Some(StackUsage::Measured { bytes: 0x80 }),
            }
        );
        assert_eq!(
            records[3],
            Record::Thread {
                id: 2,
                entry: 0x0800_0801,
                stack_start: 0x2000_3000,
                stack_end: 0x2000_3200,
                stack_size: 0x200,
                stack_used: 0x40,
            }
        );
    }

    #[test]
    fn test_decode_isr_markers() {
        let not_measured = "isr_stack ( start: 20001000 end: 20001400 size: 00000400 used: -------- )\r\n";
        let full = "isr_stack ( start: 20001000 end: 20001400 size: 00000400 used: 00000400 ! )\r\n";
        assert!(matches!(
            decode::decode(not_measured).unwrap()[0],
            Record::IsrStack { used: Some(StackUsage::NotMeasured), .. }
        ));
        assert!(matches!(
            decode::decode(full).unwrap()[0],
            Record::IsrStack { used: Some(StackUsage::AtCapacity { bytes: 0x400 }), .. }
        ));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode::decode(HEAP_LINE.trim_end()),
            Err(DecodeError::Truncated)
        );
        assert_eq!(
            decode::decode("hello\r\n"),
            Err(DecodeError::UnknownRecord { line: 1 })
        );
        let lowercase = THREAD_1.replace("000001A0", "000001a0");
        assert_eq!(
            decode::decode(&format!("{}{}", HEAP_LINE, lowercase)),
            Err(DecodeError::BadHex { line: 2, field: "used" })
        );
        let short = ISR_LINE.replace("20001400", "2000140");
        assert!(decode::decode(&short).is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let record = decode::decode(THREAD_1).unwrap()[0];
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["kind"], "thread");
        assert_eq!(json["id"], 1);
        assert_eq!(json["stack_used"], 0x1a0);
    }

    #[test]
    fn test_trace_unit_drops_until_enabled() {
        let mut unit = TraceUnit::new();
        let stim = TraceRegister::ItmStimulus(0).addr() - PPB_BASE;
        unit.write_u8(stim, b'x').unwrap();
        assert_eq!(unit.dropped(), 1);

        // Locked: TCR ignored, so still not emitting.
        unit.write(TraceRegister::Demcr.addr() - PPB_BASE, 1 << 24).unwrap();
        unit.write(TraceRegister::ItmTcr.addr() - PPB_BASE, 1).unwrap();
        unit.write(TraceRegister::ItmTer.addr() - PPB_BASE, 1).unwrap();
        unit.write_u8(stim, b'y').unwrap();
        assert!(unit.captured(0).is_empty());
        assert_eq!(unit.enable_count(), 0);
    }

    #[test]
    fn test_trace_unit_rejects_unnamed_register() {
        let unit = TraceUnit::new();
        assert_eq!(
            unit.read(0x0000_0F00),
            Err(SimError::UnmappedPeripheral(PPB_BASE + 0x0F00))
        );
    }

    #[test]
    fn test_sink_waits_for_fifo() {
        let mut bus = SystemBus::new();
        bus.map(TRACE_UNIT, PPB_BASE, PPB_SIZE, Box::new(TraceUnit::with_busy_polls(3)));
        let mut sink = TraceSink::new(&mut bus, TraceConfig::new(0, 48_000_000).unwrap());
        sink.emit_byte(b'A');
        sink.emit_byte(b'B');
        drop(sink);

        let unit = bus.peripheral::<TraceUnit>(TRACE_UNIT).unwrap();
        assert_eq!(unit.captured(0), b"AB");
        assert_eq!(unit.stimulus_polls(), 8);
        assert_eq!(unit.enable_count(), 1);
    }

    #[test]
    fn test_bus_records_unmapped_access() {
        let mut bus = SystemBus::new();
        bus.map("uart0", 0x4000_C000, 0x1000, Box::new(Pl011Model::new()));
        assert_eq!(bus.read_u32(0x5000_0000), 0);
        bus.write_u32(0x4000_C000, 0x41);
        assert_eq!(bus.violations(), vec![SimError::UnmappedPeripheral(0x5000_0000)]);
        // UART disabled: the byte is dropped, not a fault.
        assert_eq!(bus.peripheral::<Pl011Model>("uart0").unwrap().dropped(), 1);
    }

    #[test]
    fn test_linear_memory_bounds() {
        let mut ram = LinearMemory::new(16, 0x2000_0000);
        ram.write_u32(0x2000_000C, 0xDEAD_BEEF);
        assert_eq!(ram.read_u32(0x2000_000C), 0xDEAD_BEEF);
        assert_eq!(ram.read_u8(0x2000_000F), 0xDE);
        assert_eq!(ram.read_u32(0x2000_000E), 0);
        assert_eq!(ram.violations(), 1);
        assert!(!ram.fill(0x2000_0008, 16, 0));
    }
}
