use super::{error, Error};

impl Error {
    error!(
        KRB5_PARSE_MALFORMED,
        -1765328250, "Malformed representation of principal"
    );
    error!(
        KRB5_CC_UNKNOWN_TYPE,
        -1765328244, "Unknown credential cache type"
    );
    error!(KRB5_CC_NOTFOUND, -1765328243, "Matching credential not found");
    error!(KRB5_FCC_NOFILE, -1765328189, "No credentials cache found");
    error!(
        KRB5_CCACHE_BADVNO,
        -1765328188, "Credentials cache file format version not supported"
    );
    error!(KRB5_CC_FORMAT, -1765328185, "Bad format in credentials cache");
    error!(
        KRB5_CONFIG_NODEFREALM,
        -1765328160, "Configuration file does not specify default realm"
    );

    // Local additions, numbered below the MIT table.
    error!(
        KRB5_CC_TRUNCATED,
        -1765328000, "Credentials cache ended in the middle of a field"
    );
    error!(
        KRB5_CC_BADTAG,
        -1765327999, "Invalid header tag in credentials cache"
    );
    error!(
        KRB5_CC_PRINC_MISMATCH,
        -1765327998, "Primary principals don't match"
    );
    error!(
        KRB5_CC_MALFORMED_RECORD,
        -1765327997, "Malformed credentials cache entry"
    );
    error!(
        KRB5_CC_BADADDR,
        -1765327996, "Incorrect address format in credentials cache entry"
    );
    error!(
        KRB5_CC_NOIMPERSONATION,
        -1765327995, "Impersonation evidence not available in credentials cache"
    );
    error!(
        KRB5_CONFIG_BADIMPERSONATE,
        -1765327994, "Invalid default_initiate_credential setting"
    );
}
