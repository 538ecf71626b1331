use sispm_types::{DeviceType, OutletIndex, OutletState};
use sispm_usb::devices::{list_devices, DEFAULT_TIMEOUT};
use sispm_usb::rusb;
use sispm_usb::{
    ExecutableSisPm, MemoryBus, MemoryOutletDevice, OutletBus, OutletError, OutletReading,
    RecordedTransfer, SisPmCommands, SisPmDevice, TransportError,
};

const SERIAL: [u8; 6] = [0x01, 0x01, 0x2f, 0x0a, 0x5c, 0xe3];

fn open_quad() -> (MemoryBus, SisPmDevice, MemoryOutletDevice) {
    let bus = MemoryBus::new();
    let device = bus.add_device(DeviceType::SisPm, SERIAL);
    let handle = bus.open(&device, DEFAULT_TIMEOUT).expect("open failed");
    (bus, device, handle)
}

#[test]
fn single_outlet_round_trips() {
    let (_bus, _device, mut handle) = open_quad();

    for number in 1..=4 {
        let outlet = OutletIndex::Number(number);
        for state in [OutletState::On, OutletState::Off] {
            handle.set_outlet(outlet, state).unwrap();
            assert_eq!(
                handle.get_outlet_state(outlet).unwrap(),
                OutletReading::One(state)
            );
        }
    }
}

#[test]
fn all_outlets_round_trip() {
    let (bus, device, mut handle) = open_quad();

    handle.set_outlet(OutletIndex::All, OutletState::On).unwrap();
    assert_eq!(
        handle.get_outlet_state(OutletIndex::All).unwrap(),
        OutletReading::All(vec![OutletState::On; 4])
    );
    assert_eq!(bus.outlet_states(&device), vec![OutletState::On; 4]);

    handle.set_outlet(OutletIndex::All, OutletState::Off).unwrap();
    let reading = handle.get_outlet_state(OutletIndex::All).unwrap();
    assert_eq!(reading.states(), &[OutletState::Off; 4]);
}

#[test]
fn switching_outlet_three_sends_one_encoded_transfer() {
    let (_bus, _device, mut handle) = open_quad();

    handle
        .set_outlet(OutletIndex::Number(3), OutletState::On)
        .unwrap();
    assert_eq!(
        handle.transfers(),
        &[RecordedTransfer {
            request_type: 0x21,
            request: 0x09,
            value: 0x0309,
            index: 0,
            data: vec![9, 3, 0, 0, 0, 0],
        }]
    );

    assert_eq!(
        handle.get_outlet_state(OutletIndex::Number(3)).unwrap(),
        OutletReading::One(OutletState::On)
    );
    assert_eq!(handle.transfers().len(), 2);
    assert_eq!(handle.transfers()[1].request_type, 0xa1);
    assert_eq!(handle.transfers()[1].value, 0x0309);
}

#[test]
fn all_outlets_are_addressed_in_ascending_order() {
    let (_bus, _device, mut handle) = open_quad();

    handle.get_outlet_state(OutletIndex::All).unwrap();
    let values: Vec<u16> = handle.transfers().iter().map(|t| t.value).collect();
    assert_eq!(values, vec![0x0303, 0x0306, 0x0309, 0x030c]);
}

#[test]
fn out_of_range_outlets_are_rejected_without_transfers() {
    let (_bus, _device, mut handle) = open_quad();

    for number in [0, 5, 255] {
        let result = handle.get_outlet_state(OutletIndex::Number(number));
        assert!(matches!(
            result,
            Err(OutletError::InvalidArgument { outlet, count: 4 }) if outlet == number
        ));

        let result = handle.set_outlet(OutletIndex::Number(number), OutletState::On);
        assert!(matches!(result, Err(OutletError::InvalidArgument { .. })));

        let result = handle.toggle_outlet(OutletIndex::Number(number));
        assert!(matches!(result, Err(OutletError::InvalidArgument { .. })));
    }
    assert!(handle.transfers().is_empty());
}

#[test]
fn single_socket_devices_only_have_outlet_one() {
    let bus = MemoryBus::new();
    let device = bus.add_device(DeviceType::MsisPmFlash, SERIAL);
    let mut handle = bus.open(&device, DEFAULT_TIMEOUT).unwrap();

    assert_eq!(handle.outlets(), 1..=1);
    assert!(matches!(
        handle.set_outlet(OutletIndex::Number(2), OutletState::On),
        Err(OutletError::InvalidArgument { outlet: 2, count: 1 })
    ));

    handle.set_outlet(OutletIndex::All, OutletState::On).unwrap();
    assert_eq!(
        handle.get_outlet_state(OutletIndex::All).unwrap(),
        OutletReading::All(vec![OutletState::On])
    );
}

#[test]
fn partial_failure_stops_at_the_failing_outlet() {
    let (bus, device, mut handle) = open_quad();
    bus.fail_outlet(&device, 3, rusb::Error::Io);

    let result = handle.set_outlet(OutletIndex::All, OutletState::On);
    assert!(matches!(
        result,
        Err(OutletError::Transport(TransportError::Usb(rusb::Error::Io)))
    ));

    // Outlet 4 was never attempted.
    assert_eq!(handle.transfers().len(), 3);
    assert_eq!(
        bus.outlet_states(&device),
        vec![
            OutletState::On,
            OutletState::On,
            OutletState::Off,
            OutletState::Off
        ]
    );
}

#[test]
fn timeouts_surface_as_timeouts() {
    let (bus, device, mut handle) = open_quad();
    bus.fail_outlet(&device, 1, rusb::Error::Timeout);

    assert!(matches!(
        handle.get_outlet_state(OutletIndex::Number(1)),
        Err(OutletError::Timeout)
    ));
    assert!(matches!(
        handle.get_outlet_state(OutletIndex::All),
        Err(OutletError::Timeout)
    ));
}

#[test]
fn close_is_idempotent_and_final() {
    let (_bus, _device, mut handle) = open_quad();
    handle
        .set_outlet(OutletIndex::Number(1), OutletState::On)
        .unwrap();

    handle.close();
    handle.close();
    assert!(handle.is_closed());
    assert_eq!(handle.release_count(), 1);
    assert_eq!(handle.transfers().len(), 1);

    assert!(matches!(
        handle.get_outlet_state(OutletIndex::Number(1)),
        Err(OutletError::Transport(TransportError::Closed))
    ));
    assert!(matches!(
        handle.get_descriptor(),
        Err(OutletError::Transport(TransportError::Closed))
    ));
    assert_eq!(handle.transfers().len(), 1);
}

#[test]
fn stale_descriptors_fail_with_not_found() {
    let bus = MemoryBus::new();
    let device = bus.add_device(DeviceType::SisPm, SERIAL);
    let mut handle = bus.open(&device, DEFAULT_TIMEOUT).unwrap();
    let descriptors = list_devices(&bus);

    bus.unplug(&device);

    assert!(matches!(
        bus.open(&descriptors[0], DEFAULT_TIMEOUT),
        Err(OutletError::NotFound)
    ));
    assert!(matches!(
        handle.set_outlet(OutletIndex::Number(1), OutletState::On),
        Err(OutletError::NotFound)
    ));
}

#[test]
fn descriptor_strings_fail_once_unplugged() {
    let (bus, device, handle) = open_quad();
    assert_eq!(handle.get_descriptor().unwrap().device_manufacturer(), "Gembird");

    bus.unplug(&device);
    assert!(matches!(
        handle.get_descriptor(),
        Err(OutletError::NotFound)
    ));
}

#[test]
fn permission_problems_surface_on_open() {
    let bus = MemoryBus::new();
    let device = bus.add_device(DeviceType::SisPm, SERIAL);
    bus.deny_access(&device);

    assert!(matches!(
        bus.open(&device, DEFAULT_TIMEOUT),
        Err(OutletError::PermissionDenied)
    ));
}

#[test]
fn toggle_flips_each_outlet() {
    let (bus, device, mut handle) = open_quad();
    handle
        .set_outlet(OutletIndex::Number(2), OutletState::On)
        .unwrap();

    let toggled = handle.toggle_outlet(OutletIndex::All).unwrap();
    assert_eq!(
        toggled,
        vec![
            (1, OutletState::On),
            (2, OutletState::Off),
            (3, OutletState::On),
            (4, OutletState::On),
        ]
    );
    assert_eq!(
        bus.outlet_states(&device),
        vec![
            OutletState::On,
            OutletState::Off,
            OutletState::On,
            OutletState::On
        ]
    );

    let toggled = handle.toggle_outlet(OutletIndex::Number(2)).unwrap();
    assert_eq!(toggled, vec![(2, OutletState::On)]);
}

#[test]
fn device_info_reports_static_fields() {
    let (_bus, device, mut handle) = open_quad();

    let info = handle.device_info().unwrap();
    assert_eq!(info.serial(), "01:01:2f:0a:5c:e3");
    assert_eq!(info.outlet_count(), 4);
    assert_eq!(info.device_type(), DeviceType::SisPm);
    assert_eq!(info.vendor_id(), 0x04b4);
    assert_eq!(info.product_id(), 0xfd11);
    assert_eq!(info.bus_number(), device.bus_number());
    assert_eq!(info.address(), device.address());

    let transfer = &handle.transfers()[0];
    assert_eq!(transfer.request_type, 0xa1);
    assert_eq!(transfer.value, 0x0301);
}

#[test]
fn outlet_state_persists_across_handles() {
    let (bus, device, mut handle) = open_quad();
    handle
        .set_outlet(OutletIndex::Number(4), OutletState::On)
        .unwrap();
    drop(handle);

    let mut reopened = bus.open(&device, DEFAULT_TIMEOUT).unwrap();
    assert_eq!(
        reopened.get_outlet_state(OutletIndex::Number(4)).unwrap(),
        OutletReading::One(OutletState::On)
    );
}

#[test]
fn handles_for_different_devices_are_independent() {
    let bus = MemoryBus::new();
    let first = bus.add_device(DeviceType::SisPm, [1; 6]);
    let second = bus.add_device(DeviceType::SisPm, [2; 6]);

    let threads: Vec<_> = [first, second]
        .into_iter()
        .enumerate()
        .map(|(position, device)| {
            let mut handle = bus.open(&device, DEFAULT_TIMEOUT).unwrap();
            std::thread::spawn(move || {
                let outlet = OutletIndex::Number(position as u8 + 1);
                handle.set_outlet(outlet, OutletState::On).unwrap();
                handle.transfers().len()
            })
        })
        .collect();

    for thread in threads {
        assert_eq!(thread.join().unwrap(), 1);
    }

    assert_eq!(bus.outlet_states(&first)[0], OutletState::On);
    assert_eq!(bus.outlet_states(&first)[1], OutletState::Off);
    assert_eq!(bus.outlet_states(&second)[0], OutletState::Off);
    assert_eq!(bus.outlet_states(&second)[1], OutletState::On);
}
