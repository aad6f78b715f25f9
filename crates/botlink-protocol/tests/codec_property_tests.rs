//! 编解码属性测试
//!
//! 使用 proptest 验证线上格式在整个取值范围内可逆。

use botlink_protocol::{DecodeOptions, FrameDecoder, LedShape, Message, decode, encode};
use proptest::prelude::*;

fn host_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        Just(Message::Hello),
        Just(Message::Stop),
        (any::<i8>(), any::<i16>()).prop_map(|(id, position)| Message::Servo { id, position }),
        (any::<i8>(), any::<i16>()).prop_map(|(id, delta)| Message::ServoRelative { id, delta }),
        (any::<u8>(), any::<bool>()).prop_map(|(pin, high)| Message::Pin { pin, high }),
        any::<u8>().prop_map(|pin| Message::PinRead { pin }),
        (prop::collection::vec(any::<u8>(), 1..40), any::<(u8, u8, u8)>())
            .prop_map(|(indices, rgb)| Message::led_color(indices, rgb)),
    ]
}

proptest! {
    /// SERVO 在完整的 id/位置范围内可逆
    #[test]
    fn servo_roundtrip(id in any::<i8>(), position in any::<i16>()) {
        let message = Message::Servo { id, position };
        let bytes = encode(&message).unwrap();
        let (decoded, consumed) = decode(&bytes, DecodeOptions::from_host()).unwrap();
        prop_assert_eq!(decoded, message);
        prop_assert_eq!(consumed, 4);
    }

    /// 标量 LED 在选择标量形状时可逆
    #[test]
    fn led_scalar_roundtrip(index in any::<u8>(), intensity in any::<i16>()) {
        let message = Message::LedSingle { index, intensity };
        let bytes = encode(&message).unwrap();
        let options = DecodeOptions::from_host().with_led_shape(LedShape::Scalar);
        let (decoded, _) = decode(&bytes, options).unwrap();
        prop_assert_eq!(decoded, message);
    }

    /// 主机消息拼接成流后，增量解码得到相同序列
    #[test]
    fn stream_of_host_messages(messages in prop::collection::vec(host_message(), 0..32)) {
        let mut stream = Vec::new();
        for message in &messages {
            stream.extend_from_slice(&encode(message).unwrap());
        }

        let mut decoder = FrameDecoder::new(DecodeOptions::from_host());
        let decoded = decoder.push_slice(&stream);
        prop_assert_eq!(decoded, messages);
        prop_assert_eq!(decoder.total_discards(), 0);
    }

    /// 固件应答（PIN_READ 读数、ERROR）可逆
    #[test]
    fn device_replies_roundtrip(value in any::<i16>(), code in any::<i16>()) {
        for message in [Message::PinValue { value }, Message::Error { code }] {
            let bytes = encode(&message).unwrap();
            let (decoded, _) = decode(&bytes, DecodeOptions::from_device()).unwrap();
            prop_assert_eq!(decoded, message);
        }
    }
}
