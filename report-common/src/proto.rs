//! Protobuf messages published on the storm reports topic.
//!
//! The three schemas share one layout and differ only in the name of their measurement
//! field (tag 3). Field 1 repeats the report type so a payload decoded under the wrong
//! schema can be told apart from a valid one.

use crate::decode::DecodedEvent;
use crate::report::ReportType;

#[derive(Clone, PartialEq, prost::Message)]
pub struct HailMsg {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(int64, tag = "2")]
    pub time: i64,
    /// Hail diameter in hundredths of an inch.
    #[prost(int32, tag = "3")]
    pub size: i32,
    #[prost(int32, tag = "4")]
    pub distance: i32,
    #[prost(string, tag = "5")]
    pub direction: String,
    #[prost(string, tag = "6")]
    pub location: String,
    #[prost(string, tag = "7")]
    pub county: String,
    #[prost(string, tag = "8")]
    pub state: String,
    #[prost(string, tag = "9")]
    pub lat: String,
    #[prost(string, tag = "10")]
    pub lon: String,
    #[prost(string, tag = "11")]
    pub remarks: String,
    #[prost(string, optional, tag = "12")]
    pub office: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WindMsg {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(int64, tag = "2")]
    pub time: i64,
    /// Gust speed in miles per hour.
    #[prost(int32, tag = "3")]
    pub speed: i32,
    #[prost(int32, tag = "4")]
    pub distance: i32,
    #[prost(string, tag = "5")]
    pub direction: String,
    #[prost(string, tag = "6")]
    pub location: String,
    #[prost(string, tag = "7")]
    pub county: String,
    #[prost(string, tag = "8")]
    pub state: String,
    #[prost(string, tag = "9")]
    pub lat: String,
    #[prost(string, tag = "10")]
    pub lon: String,
    #[prost(string, tag = "11")]
    pub remarks: String,
    #[prost(string, optional, tag = "12")]
    pub office: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TornadoMsg {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(int64, tag = "2")]
    pub time: i64,
    /// Enhanced Fujita rating.
    #[prost(int32, tag = "3")]
    pub f_scale: i32,
    #[prost(int32, tag = "4")]
    pub distance: i32,
    #[prost(string, tag = "5")]
    pub direction: String,
    #[prost(string, tag = "6")]
    pub location: String,
    #[prost(string, tag = "7")]
    pub county: String,
    #[prost(string, tag = "8")]
    pub state: String,
    #[prost(string, tag = "9")]
    pub lat: String,
    #[prost(string, tag = "10")]
    pub lon: String,
    #[prost(string, tag = "11")]
    pub remarks: String,
    #[prost(string, optional, tag = "12")]
    pub office: Option<String>,
}

/// Read access to the fields every report schema carries.
pub trait ReportFields {
    /// The report type written by the producer.
    fn embedded_type(&self) -> &str;
    /// Occurrence time in epoch seconds.
    fn time(&self) -> i64;
    /// The schema's measurement: size, speed or F-scale.
    fn magnitude(&self) -> i32;
    fn distance(&self) -> i32;
    fn direction(&self) -> &str;
    fn location(&self) -> &str;
    fn county(&self) -> &str;
    fn state(&self) -> &str;
    fn lat(&self) -> &str;
    fn lon(&self) -> &str;
    fn remarks(&self) -> &str;
    fn office(&self) -> Option<&str>;
}

/// A protobuf schema bound to the report type it carries.
pub trait ReportSchema: prost::Message + Default + ReportFields + Sized {
    const REPORT_TYPE: ReportType;

    fn into_event(self) -> DecodedEvent;
}

/// One mapping entry per schema: the message type, its report type, the `DecodedEvent`
/// variant holding it and the name of its measurement field.
macro_rules! report_schema {
    ($msg:ident, $report_type:expr, $variant:ident, $magnitude:ident) => {
        impl ReportFields for $msg {
            fn embedded_type(&self) -> &str {
                &self.r#type
            }
            fn time(&self) -> i64 {
                self.time
            }
            fn magnitude(&self) -> i32 {
                self.$magnitude
            }
            fn distance(&self) -> i32 {
                self.distance
            }
            fn direction(&self) -> &str {
                &self.direction
            }
            fn location(&self) -> &str {
                &self.location
            }
            fn county(&self) -> &str {
                &self.county
            }
            fn state(&self) -> &str {
                &self.state
            }
            fn lat(&self) -> &str {
                &self.lat
            }
            fn lon(&self) -> &str {
                &self.lon
            }
            fn remarks(&self) -> &str {
                &self.remarks
            }
            fn office(&self) -> Option<&str> {
                self.office.as_deref()
            }
        }

        impl ReportSchema for $msg {
            const REPORT_TYPE: ReportType = $report_type;

            fn into_event(self) -> DecodedEvent {
                DecodedEvent::$variant(self)
            }
        }
    };
}

report_schema!(HailMsg, ReportType::Hail, Hail, size);
report_schema!(WindMsg, ReportType::Wind, Wind, speed);
report_schema!(TornadoMsg, ReportType::Tornado, Tornado, f_scale);
