//! Diagnostic status codes reported by the agent and their classification.
//! - classify: rich result used for the primary view
//! - filter_status/filter_result: two-way view used for filtered results

use crate::plan::ResultState;

pub const FAILURE: i64 = 1;
pub const SUCCESS: i64 = 0;

// generic codes
pub const NOT_APPLICABLE: i64 = -1;
pub const CANCELLED: i64 = -2;
pub const INTERNAL_TEST_ERROR: i64 = -3;
pub const CANCELLED_NOT_STANDBY: i64 = -4;

// specific codes
pub const HDD_STATUS_MISSING: i64 = -100;
pub const HDMI_NO_DISPLAY: i64 = -101;
pub const HDMI_NO_HDCP: i64 = -102;
pub const MOCA_NO_CLIENTS: i64 = -103;
pub const MOCA_DISABLED: i64 = -104;
pub const SI_CACHE_MISSING: i64 = -105;
pub const TUNER_NO_LOCK: i64 = -106;
pub const AV_NO_SIGNAL: i64 = -107;
pub const IR_NOT_DETECTED: i64 = -108;
pub const CM_NO_SIGNAL: i64 = -109;
pub const TUNER_BUSY: i64 = -111;
pub const RF4CE_NO_RESPONSE: i64 = -112;
pub const WIFI_NO_CONNECTION: i64 = -113;
pub const AV_URL_NOT_REACHABLE: i64 = -114;
pub const NON_RF4CE_INPUT: i64 = -117;
pub const RF4CE_CTRLM_NO_RESPONSE: i64 = -120;
pub const HDD_MARGINAL_ATTRIBUTES_FOUND: i64 = -121;
pub const NO_GATEWAY_CONNECTION: i64 = -123;
pub const NO_COMCAST_WAN_CONNECTION: i64 = -124;
pub const NO_PUBLIC_WAN_CONNECTION: i64 = -125;
pub const NO_WAN_CONNECTION: i64 = -126;
pub const HDD_DEVICE_NODE_NOT_FOUND: i64 = -127;
pub const NO_ETH_GATEWAY_FOUND: i64 = -128;
pub const NO_MW_GATEWAY_FOUND: i64 = -129;
pub const NO_ETH_GATEWAY_CONNECTION: i64 = -130;
pub const NO_MW_GATEWAY_CONNECTION: i64 = -131;

/// Initial status of an element that has not reported anything yet.
pub const DEFAULT_RESULT_VALUE: i64 = -200;

// hard failures
pub const BLUETOOTH_INTERFACE_FAILURE: i64 = -211;
pub const FILE_WRITE_OPERATION_FAILURE: i64 = -212;
pub const FILE_READ_OPERATION_FAILURE: i64 = -213;
pub const EMMC_TYPEA_MAX_LIFE_EXCEED_FAILURE: i64 = -214;
pub const EMMC_TYPEB_MAX_LIFE_EXCEED_FAILURE: i64 = -215;
pub const EMMC_TYPEA_ZERO_LIFETIME_FAILURE: i64 = -216;
pub const EMMC_TYPEB_ZERO_LIFETIME_FAILURE: i64 = -217;
pub const MCARD_AUTH_KEY_REQUEST_FAILURE: i64 = -218;
pub const MCARD_HOSTID_RETRIEVE_FAILURE: i64 = -219;
pub const MCARD_CERT_AVAILABILITY_FAILURE: i64 = -220;
pub const RF4CE_CHIP_DISCONNECTED: i64 = -221;
pub const SD_CARD_TSB_STATUS_FAILURE: i64 = -222;
pub const SD_CARD_ZERO_MAXMINUTES_FAILURE: i64 = -223;

/// Status recorded for a diagnostic whose start request was rejected or lost.
pub const STARTUP_FAILURE: i64 = NOT_APPLICABLE;

const HARD_FAILURES: &[i64] = &[
    BLUETOOTH_INTERFACE_FAILURE,
    FILE_WRITE_OPERATION_FAILURE,
    FILE_READ_OPERATION_FAILURE,
    EMMC_TYPEA_MAX_LIFE_EXCEED_FAILURE,
    EMMC_TYPEB_MAX_LIFE_EXCEED_FAILURE,
    EMMC_TYPEA_ZERO_LIFETIME_FAILURE,
    EMMC_TYPEB_ZERO_LIFETIME_FAILURE,
    MCARD_AUTH_KEY_REQUEST_FAILURE,
    MCARD_HOSTID_RETRIEVE_FAILURE,
    MCARD_CERT_AVAILABILITY_FAILURE,
    RF4CE_CHIP_DISCONNECTED,
    SD_CARD_TSB_STATUS_FAILURE,
    SD_CARD_ZERO_MAXMINUTES_FAILURE,
];

const ADVISORIES: &[i64] = &[
    NOT_APPLICABLE,
    CANCELLED,
    INTERNAL_TEST_ERROR,
    CANCELLED_NOT_STANDBY,
    HDD_STATUS_MISSING,
    HDMI_NO_DISPLAY,
    HDMI_NO_HDCP,
    MOCA_NO_CLIENTS,
    MOCA_DISABLED,
    SI_CACHE_MISSING,
    TUNER_NO_LOCK,
    AV_NO_SIGNAL,
    IR_NOT_DETECTED,
    CM_NO_SIGNAL,
    TUNER_BUSY,
    RF4CE_NO_RESPONSE,
    WIFI_NO_CONNECTION,
    AV_URL_NOT_REACHABLE,
    NON_RF4CE_INPUT,
    RF4CE_CTRLM_NO_RESPONSE,
    HDD_MARGINAL_ATTRIBUTES_FOUND,
    NO_GATEWAY_CONNECTION,
    NO_COMCAST_WAN_CONNECTION,
    NO_PUBLIC_WAN_CONNECTION,
    NO_WAN_CONNECTION,
    HDD_DEVICE_NODE_NOT_FOUND,
    NO_ETH_GATEWAY_FOUND,
    NO_MW_GATEWAY_FOUND,
    NO_ETH_GATEWAY_CONNECTION,
    NO_MW_GATEWAY_CONNECTION,
];

/// Map a diagnostic status code onto the primary result view.
#[must_use]
pub fn classify(status: i64) -> ResultState {
    match status {
        SUCCESS => ResultState::Passed,
        FAILURE => ResultState::Error,
        code if HARD_FAILURES.contains(&code) => ResultState::Error,
        code if ADVISORIES.contains(&code) => ResultState::Warning,
        code if code < 0 => ResultState::Warning,
        _ => ResultState::Error,
    }
}

/// Two-way filter classification computed locally when the agent did not filter.
#[must_use]
pub fn filter_status(status: i64) -> i64 {
    if status == FAILURE || status <= BLUETOOTH_INTERFACE_FAILURE {
        FAILURE
    } else {
        SUCCESS
    }
}

#[must_use]
pub fn filter_result(filter_status: i64) -> ResultState {
    if filter_status == SUCCESS {
        ResultState::Passed
    } else {
        ResultState::Error
    }
}
