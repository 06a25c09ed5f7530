/// Numeric result codes returned to callers.
///
/// These values are part of the wire contract shared with game clients and
/// server SDKs; they must never be renumbered. Every response carries one of
/// these codes plus its message, regardless of HTTP status.

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;

// Request boundary
pub const APP_ID_ERROR: i32 = 101;
pub const SIGN_ERROR: i32 = 105;
pub const GAME_ID_NOT_EXISTS: i32 = 106;
pub const REQUEST_DATA_PARSER_ERROR: i32 = 107;
pub const REQUEST_DATA_VALIDATOR_FAIL: i32 = 108;
pub const REQUEST_DATA_INCORRECT: i32 = 109;
pub const LOGIN_TOKEN_PARSE_ERROR: i32 = 112;
pub const LOGIN_TOKEN_UID_UNEQUAL: i32 = 113;

// Rate limiting
pub const LIMIT_IP_TRIGGER: i32 = 114;
pub const LIMIT_LOGIN_IP_LOCK: i32 = 116;
pub const LIMIT_VERIFY_CODE_ACCOUNT: i32 = 119;
pub const LIMIT_VERIFY_CODE_LOCK_IP: i32 = 120;
pub const LIMIT_REGISTER_LOCK_IP: i32 = 122;
pub const LIMIT_CAPTCHA_ERROR: i32 = 123;

// Verification codes / token issuance
pub const VERIFY_CODE_NOT_EXISTS: i32 = 1201;
pub const VERIFY_CODE_ERROR: i32 = 1202;
pub const BUILD_TOKEN_FAILURE: i32 = 1205;
pub const EMAIL_FORMAT_ERROR: i32 = 1207;
pub const PHONE_NUM_FORMAT_ERROR: i32 = 1208;
pub const USERNAME_LENGTH_ERROR: i32 = 1209;
pub const USERNAME_FORMAT_ERROR: i32 = 1210;
pub const GUEST_OR_THIRD_LENGTH_ERROR: i32 = 1211;
pub const GUEST_OR_THIRD_FORMAT_ERROR: i32 = 1212;

// Register
pub const THIRD_ID_PARSE_FAILURE: i32 = 2309;
pub const THIRD_ID_UNSUPPORTED: i32 = 2310;
pub const GET_HASH_DB_TX_ERROR: i32 = 2312;
pub const GET_ACCOUNT_DB_TX_ERROR: i32 = 2313;
pub const GET_GAME_USER_DB_TX_ERROR: i32 = 2314;
pub const TX_EXEC_INSERT_HASH_ERROR: i32 = 2315;
pub const TX_EXEC_INSERT_ACCOUNT_ERROR: i32 = 2316;
pub const TX_EXEC_INSERT_GAME_USER_ERROR: i32 = 2317;
pub const TX_HASH_DB_COMMIT_ERROR: i32 = 2318;
pub const TX_ACCOUNT_DB_COMMIT_ERROR: i32 = 2322;
pub const REGISTER_CODE_AND_PASSWORD_EMPTY: i32 = 2319;
pub const REGISTER_SUCCESS: i32 = 2320;
pub const BUILD_ACCOUNT_UID_ERROR: i32 = 2321;

// Login
pub const LOGIN_ACCOUNT_DISABLED: i32 = 3324;
pub const LOGIN_USER_OR_PASSWORD_ERROR: i32 = 3327;
pub const LOGIN_CODE_AND_PASSWORD_EMPTY: i32 = 3328;
pub const ACCOUNT_IS_BEING_DELETED: i32 = 3333;
pub const LOGIN_INSERT_GAME_USER_ERROR: i32 = 3338;
pub const LOGIN_SUCCESS: i32 = 3339;

// Password flows
pub const FORGET_PASSWORD_UPDATE_FAILURE: i32 = 4340;
pub const FORGET_PASSWORD_ACCOUNT_NOT_EXISTS: i32 = 4341;
pub const OLD_PASSWORD_ERROR: i32 = 5360;
pub const CHANGE_PASSWORD_ACCOUNT_NOT_EXISTS: i32 = 5361;
pub const CHANGE_PASSWORD_UPDATE_FAILURE: i32 = 5362;
pub const CHANGE_PASSWORD_UID_NOT_MATCH: i32 = 5365;

// Verification code delivery
pub const SEND_CODE_ACCOUNT_NOT_EXISTS: i32 = 6384;
pub const SEND_CODE_ACCOUNT_ALREADY_EXISTS: i32 = 6385;
pub const VERIFY_CODE_INSERT_ERROR: i32 = 6387;
pub const VERIFY_CODE_TYPE_UNKNOWN: i32 = 6389;

// Bind
pub const BIND_ACCOUNT_NOT_EXISTS: i32 = 7301;
pub const GET_BIND_INFO_NOT_FOUND: i32 = 7335;
pub const BIND_ACCOUNT_ALREADY_EXISTS: i32 = 7338;
pub const BIND_GET_HASH_TX_ERROR: i32 = 7339;
pub const BIND_GET_ACCOUNT_DB_TX_ERROR: i32 = 7340;
pub const BIND_HASH_TX_EXEC_INSERT_ERROR: i32 = 7341;
pub const BIND_GAME_TX_EXEC_INSERT_ERROR: i32 = 7342;
pub const BIND_ACCOUNT_TX_EXEC_UPDATE_ERROR: i32 = 7343;
pub const BIND_GET_GAME_USER_DB_TX_ERROR: i32 = 7346;
pub const BIND_EMAIL_ALREADY_EXISTS: i32 = 7348;
pub const BIND_MOBILE_ALREADY_EXISTS: i32 = 7349;

// Unbind
pub const UNBIND_ACCOUNT_NOT_EXISTS: i32 = 8320;
pub const EMAIL_ALREADY_UNBIND: i32 = 8323;
pub const MOBILE_ALREADY_UNBIND: i32 = 8324;
pub const BE_UNBIND_ACCOUNT_NOT_EXISTS: i32 = 8332;
pub const UNBIND_ACCOUNT_NOT_MATCH: i32 = 8333;
pub const UNBIND_UNSUPPORT_REGISTER_TYPE: i32 = 8337;
pub const UNBIND_GET_HASH_TX_ERROR: i32 = 8338;
pub const UNBIND_GET_ACCOUNT_DB_TX_ERROR: i32 = 8339;
pub const UNBIND_GET_GAME_USER_DB_TX_ERROR: i32 = 8340;
pub const UNBIND_GAME_USER_TX_EXEC_DELETE_ERROR: i32 = 8341;
pub const UNBIND_HASH_TX_EXEC_ERROR: i32 = 8342;
pub const UNBIND_ACCOUNT_TX_EXEC_UPDATE_ERROR: i32 = 8343;

// Server-side auth
pub const LOGIN_AUTH_TOKEN_PARSE_ERROR: i32 = 9341;
pub const LOGIN_TOKEN_UID_NOT_MATCH: i32 = 9342;
pub const NOT_IN_WHITE_LIST: i32 = 9343;

// Deletion lifecycle
pub const ADD_DELETE_APPLY_ERROR: i32 = 10365;
pub const DELETE_APPLY_UPDATE_USER_STATUS_ERROR: i32 = 10366;
pub const DELETE_APPLY_ALREADY_EXISTS: i32 = 10367;
pub const DELETE_ACCOUNT_NOT_EXISTS: i32 = 10368;
pub const DELETE_ACCOUNT_AND_UID_NOT_MATCH: i32 = 10371;
pub const UNDO_DELETE_APPLY_NOT_EXISTS: i32 = 11385;
pub const UNDO_DELETE_ACCOUNT_NOT_EXISTS: i32 = 11386;

// Real-name verification
pub const REAL_NAME_NAME_ERROR: i32 = 12300;
pub const REAL_NAME_CARD_ID_ERROR: i32 = 12301;
pub const REAL_NAME_UPDATE_ERROR: i32 = 12303;
pub const REAL_NAME_ACCOUNT_NOT_EXISTS: i32 = 12304;

/// Human-readable message for a result code.
pub fn message(code: i32) -> &'static str {
    match code {
        SUCCESS => "success",
        FAILURE => "failure",
        APP_ID_ERROR => "get app id error, may not exist",
        SIGN_ERROR => "signature error",
        GAME_ID_NOT_EXISTS => "nonexistent game id",
        REQUEST_DATA_PARSER_ERROR => "data parsing error requested",
        REQUEST_DATA_VALIDATOR_FAIL => "request data check failed",
        REQUEST_DATA_INCORRECT => "the requested data is incorrect",
        LOGIN_TOKEN_PARSE_ERROR => "login token parsing error",
        LOGIN_TOKEN_UID_UNEQUAL => "login token uid is not equal to incoming uid",
        LIMIT_IP_TRIGGER => "trigger ip access restriction rule",
        LIMIT_LOGIN_IP_LOCK => "login restriction, ip locked",
        LIMIT_VERIFY_CODE_ACCOUNT => "verification code send frequency limit reached for account",
        LIMIT_VERIFY_CODE_LOCK_IP => "verification code send frequency: ip locked",
        LIMIT_REGISTER_LOCK_IP => "registration limit: ip is locked",
        LIMIT_CAPTCHA_ERROR => "captcha verification error",
        VERIFY_CODE_NOT_EXISTS => "verification code does not exist",
        VERIFY_CODE_ERROR => "verification code error",
        BUILD_TOKEN_FAILURE => "generate token failed",
        EMAIL_FORMAT_ERROR => "email format error",
        PHONE_NUM_FORMAT_ERROR => "incorrectly formatted mobile number",
        USERNAME_LENGTH_ERROR => "user name length error",
        USERNAME_FORMAT_ERROR => "username format error",
        GUEST_OR_THIRD_LENGTH_ERROR => "guest or third-party id length error",
        GUEST_OR_THIRD_FORMAT_ERROR => "guest or third-party id format error",
        THIRD_ID_PARSE_FAILURE => "third-party id resolution failed",
        THIRD_ID_UNSUPPORTED => "unsupported third-party id",
        GET_HASH_DB_TX_ERROR => "get hash db transaction error",
        GET_ACCOUNT_DB_TX_ERROR => "get account db transaction error",
        GET_GAME_USER_DB_TX_ERROR => "get game user db transaction error",
        TX_EXEC_INSERT_HASH_ERROR => "account hash table insert execution error",
        TX_EXEC_INSERT_ACCOUNT_ERROR => "account table insert execution error",
        TX_EXEC_INSERT_GAME_USER_ERROR => "game user table insert execution error",
        TX_HASH_DB_COMMIT_ERROR => "hash db transaction commit failed",
        TX_ACCOUNT_DB_COMMIT_ERROR => "account db transaction commit failed",
        REGISTER_CODE_AND_PASSWORD_EMPTY => "the verification code and password cannot both be empty",
        REGISTER_SUCCESS => "successful registration",
        BUILD_ACCOUNT_UID_ERROR => "generate account uid error",
        LOGIN_ACCOUNT_DISABLED => "account is disabled",
        LOGIN_USER_OR_PASSWORD_ERROR => "account or password error",
        LOGIN_CODE_AND_PASSWORD_EMPTY => "verification code and password cannot both be empty",
        ACCOUNT_IS_BEING_DELETED => "account is being deleted",
        LOGIN_INSERT_GAME_USER_ERROR => "insert game user table failed",
        LOGIN_SUCCESS => "successful login",
        FORGET_PASSWORD_UPDATE_FAILURE => "forget password update data failure",
        FORGET_PASSWORD_ACCOUNT_NOT_EXISTS => "account does not exist",
        OLD_PASSWORD_ERROR => "original password error",
        CHANGE_PASSWORD_ACCOUNT_NOT_EXISTS => "change password, account does not exist",
        CHANGE_PASSWORD_UPDATE_FAILURE => "change password update data failure",
        CHANGE_PASSWORD_UID_NOT_MATCH => "account does not match uid",
        SEND_CODE_ACCOUNT_NOT_EXISTS => "send verification code, account does not exist",
        SEND_CODE_ACCOUNT_ALREADY_EXISTS => "send registration verification code, account already exists",
        VERIFY_CODE_INSERT_ERROR => "verification code write failure",
        VERIFY_CODE_TYPE_UNKNOWN => "unknown verification code type",
        BIND_ACCOUNT_NOT_EXISTS => "bind account, account does not exist",
        GET_BIND_INFO_NOT_FOUND => "query bound account info not found",
        BIND_ACCOUNT_ALREADY_EXISTS => "the account to be bound already exists",
        BIND_GET_HASH_TX_ERROR => "bind, get hash db transaction error",
        BIND_GET_ACCOUNT_DB_TX_ERROR => "bind, get account db transaction error",
        BIND_HASH_TX_EXEC_INSERT_ERROR => "bind, hash insert transaction execution error",
        BIND_GAME_TX_EXEC_INSERT_ERROR => "bind, game user insert transaction execution error",
        BIND_ACCOUNT_TX_EXEC_UPDATE_ERROR => "bind, account update transaction execution error",
        BIND_GET_GAME_USER_DB_TX_ERROR => "bind, get game user db transaction error",
        BIND_EMAIL_ALREADY_EXISTS => "email already bound",
        BIND_MOBILE_ALREADY_EXISTS => "mobile already bound",
        UNBIND_ACCOUNT_NOT_EXISTS => "unbind, account does not exist",
        EMAIL_ALREADY_UNBIND => "email already unbound",
        MOBILE_ALREADY_UNBIND => "mobile already unbound",
        BE_UNBIND_ACCOUNT_NOT_EXISTS => "account to be unbound does not exist",
        UNBIND_ACCOUNT_NOT_MATCH => "account to be unbound does not belong to the current account",
        UNBIND_UNSUPPORT_REGISTER_TYPE => "cannot unbind the identity type used at registration",
        UNBIND_GET_HASH_TX_ERROR => "unbind, get hash db transaction error",
        UNBIND_GET_ACCOUNT_DB_TX_ERROR => "unbind, get account db transaction error",
        UNBIND_GET_GAME_USER_DB_TX_ERROR => "unbind, get game user db transaction error",
        UNBIND_GAME_USER_TX_EXEC_DELETE_ERROR => "unbind, game user delete transaction error",
        UNBIND_HASH_TX_EXEC_ERROR => "unbind, hash delete transaction error",
        UNBIND_ACCOUNT_TX_EXEC_UPDATE_ERROR => "unbind, account update transaction error",
        LOGIN_AUTH_TOKEN_PARSE_ERROR => "login token parse failed",
        LOGIN_TOKEN_UID_NOT_MATCH => "login token does not match uid",
        NOT_IN_WHITE_LIST => "request address is not in the white list",
        ADD_DELETE_APPLY_ERROR => "add deletion application failed",
        DELETE_APPLY_UPDATE_USER_STATUS_ERROR => "deletion application user status update failed",
        DELETE_APPLY_ALREADY_EXISTS => "deletion application already exists",
        DELETE_ACCOUNT_NOT_EXISTS => "account applying for deletion does not exist",
        DELETE_ACCOUNT_AND_UID_NOT_MATCH => "account does not match uid",
        UNDO_DELETE_APPLY_NOT_EXISTS => "deletion application to undo does not exist",
        UNDO_DELETE_ACCOUNT_NOT_EXISTS => "account to undo deletion does not exist",
        REAL_NAME_NAME_ERROR => "name error",
        REAL_NAME_CARD_ID_ERROR => "id number error",
        REAL_NAME_UPDATE_ERROR => "real name update error",
        REAL_NAME_ACCOUNT_NOT_EXISTS => "account for real name verification does not exist",
        _ => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_messages() {
        for code in [
            SUCCESS,
            REGISTER_SUCCESS,
            LOGIN_SUCCESS,
            LIMIT_IP_TRIGGER,
            ACCOUNT_IS_BEING_DELETED,
            UNDO_DELETE_APPLY_NOT_EXISTS,
        ] {
            assert_ne!(message(code), "failure", "code {} should have a message", code);
        }
    }

    #[test]
    fn unknown_code_falls_back() {
        assert_eq!(message(-42), "failure");
    }
}
