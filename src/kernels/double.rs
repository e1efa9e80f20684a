//! Double-precision sources.
//!
//! Cephes-style approximations: Cody-Waite reduction, then a polynomial or
//! rational approximation on the reduced interval. Exponents are read and
//! built through the bit pattern (`as_int`, `pow2i`), so nothing here
//! depends on a libm.

macro_rules! asin_helper {
    () => {
        "    def _asin(v: {T}) -> {T}:
        a = abs(v)
        if a > 0.625:
            w = 1.0 - a
            p = (((2.967721961301243206100e-3 * w - 5.634242780008963776856e-1) * w + 6.968710824104713396794) * w - 2.556901049652824852289e1) * w + 2.853665548261061424989e1
            q = (((w - 2.194779531642920639778e1) * w + 1.470656354026814941758e2) * w - 3.838770957603691357202e2) * w + 3.424398657913078477438e2
            p = w * p / q
            w = sqrt(w + w)
            z = 7.85398163397448309616e-1 - w
            w = w * p - 6.123233995736765886130e-17
            z = z - w + 7.85398163397448309616e-1
        else:
            w = a * a
            p = ((((4.253011369004428248960e-3 * w - 6.019598008014123785661e-1) * w + 5.444622390564711410273) * w - 1.626247967210700244449e1) * w + 1.956261983317594739197e1) * w - 8.198089802484824371615
            q = ((((w - 1.474091372988853791896e1) * w + 7.049610280856842141659e1) * w - 1.471791292232726029859e2) * w + 1.395105614657485689735e2) * w - 4.918853881490881290097e1
            z = w * p / q
            z = a * z + a
        return select(-z, z, v < 0.0)
"
    };
}

macro_rules! atan_helper {
    () => {
        "    def _atan(v: {T}) -> {T}:
        a = abs(v)
        y = {T}(0.0)
        extra = {T}(0.0)
        # tan(3pi/8) and 0.66 split the range into three intervals
        if a > 2.41421356237309504880:
            y = 1.57079632679489661923
            extra = 6.123233995736765886130e-17
            a = -1.0 / a
        elif a > 0.66:
            y = 7.85398163397448309616e-1
            extra = 3.061616997868382943065e-17
            a = (a - 1.0) / (a + 1.0)
        z = a * a
        p = (((-8.750608600031904122785e-1 * z - 1.615753718733365076637e1) * z - 7.500855792314704667340e1) * z - 1.228866684490136173410e2) * z - 6.485021904942025371773e1
        q = ((((z + 2.485846490142306297962e1) * z + 1.650270098316988542046e2) * z + 4.328810604912902668951e2) * z + 4.853903996359136964868e2) * z + 1.945506571482613964425e2
        z = z * p / q
        z = a * z + a + extra
        y = y + z
        return select(-y, y, v < 0.0)
"
    };
}

macro_rules! log2_helper {
    () => {
        "    def _log2(v: {T}) -> {T}:
        tiny = v < 2.2250738585072014e-308
        s = select(v * 18014398509481984.0, v, tiny)
        b = as_int(s)
        e = as_float((b >> 52) | 0x4330000000000000) - 4503599627370496.0 - 1022.0
        e = select(e - 54.0, e, tiny)
        m = as_float((b & 0x000FFFFFFFFFFFFF) | 0x3FE0000000000000)
        low = m < 0.70710678118654752440
        e = select(e - 1.0, e, low)
        m = select(m + m - 1.0, m - 1.0, low)
        z = m * m
        p = ((((1.01875663804580931796e-4 * m + 4.97494994976747001425e-1) * m + 4.70579119878881725854) * m + 1.44989225341610930846e1) * m + 1.79368678507819816313e1) * m + 7.70838733755885391666
        q = ((((m + 1.12873587189167450590e1) * m + 4.52279145837532221105e1) * m + 8.29875266912776603211e1) * m + 7.11544750618563894466e1) * m + 2.31251620126765340583e1
        y = m * (z * p / q) - 0.5 * z
        # log2(e) - 1, so the leading terms stay exact
        r = y * 0.44269504088896340736 + m * 0.44269504088896340736 + y + m + e
        r = select(-inf, r, v == 0.0)
        return select(v, r, v == inf)
"
    };
}

macro_rules! exp2_helper {
    () => {
        "    def _exp2(w: {T}) -> {T}:
        c = min(max(w, -1100.0), 1100.0)
        n = round(c)
        f = c - n
        z = f * f
        p = ((2.30933477057345225087e-2 * z + 2.02020656693165307700e1) * z + 1.51390680115615096133e3) * f
        q = (z + 2.33184211722314911771e2) * z + 4.36821166879210612817e3
        y = p / (q - p)
        y = 2.0 * y + 1.0
        h = floor(n * 0.5)
        y = y * pow2i(h) * pow2i(n - h)
        return select(w, y, w != w)
"
    };
}

pub(super) const ASIN: &str = concat!(
    "def asin(x: {T}) -> {T}:\n",
    asin_helper!(),
    "    return _asin(x)\n"
);

pub(super) const ACOS: &str = concat!(
    "def acos(x: {T}) -> {T}:\n",
    asin_helper!(),
    "    s = x
    if x < -0.5:
        s = sqrt(0.5 * (1.0 + x))
    elif x > 0.5:
        s = sqrt(0.5 * (1.0 - x))
    t = _asin(s)
    r = 7.85398163397448309616e-1 - t + 6.123233995736765886130e-17 + 7.85398163397448309616e-1
    if x < -0.5:
        r = 3.14159265358979323846 - (t + t)
    elif x > 0.5:
        r = t + t
    return r
"
);

pub(super) const ATAN: &str = concat!(
    "def atan(x: {T}) -> {T}:\n",
    atan_helper!(),
    "    return _atan(x)\n"
);

pub(super) const ATAN2: &str = concat!(
    "def atan2(y: {T}, x: {T}) -> {T}:\n",
    atan_helper!(),
    "    # upper half plane first, then the sign of y (-0.0 included)
    neg = (y < 0.0) | (1.0 / y < 0.0)
    left = (x < 0.0) | (1.0 / x < 0.0)
    v = abs(y)
    z = select(3.14159265358979323846, 0.0, x < 0.0) + _atan(v / x)
    z = select(select(3.14159265358979323846, 0.0, left), z, (v == 0.0) & (x == x))
    z = select(1.57079632679489661923, z, (x == 0.0) & (v > 0.0))
    corner = select(2.35619449019234492885, 7.85398163397448309616e-1, x < 0.0)
    z = select(corner, z, (v == inf) & (abs(x) == inf))
    return select(-z, z, neg)
"
);

pub(super) const EXP: &str = "\
def exp(x: {T}) -> {T}:
    # beyond +-800 the result is already inf or 0
    c = min(max(x, -800.0), 800.0)
    n = round(c * 1.4426950408889634073599)
    r = c - n * 6.93145751953125e-1 - n * 1.42860682030941723212e-6
    z = r * r
    p = ((1.26177193074810590878e-4 * z + 3.02994407707441961300e-2) * z + 9.99999999999999999910e-1) * r
    q = ((3.00198505138664455042e-6 * z + 2.52448340349684104192e-3) * z + 2.27265548208155028766e-1) * z + 2.0
    y = p / (q - p)
    y = 2.0 * y + 1.0
    # two factors keep each power of two in the normal range
    h = floor(n * 0.5)
    y = y * pow2i(h) * pow2i(n - h)
    return select(x, y, x != x)
";

pub(super) const LOG: &str = "\
def log(x: {T}) -> {T}:
    tiny = x < 2.2250738585072014e-308
    v = select(x * 18014398509481984.0, x, tiny)
    b = as_int(v)
    e = as_float((b >> 52) | 0x4330000000000000) - 4503599627370496.0 - 1022.0
    e = select(e - 54.0, e, tiny)
    m = as_float((b & 0x000FFFFFFFFFFFFF) | 0x3FE0000000000000)
    low = m < 0.70710678118654752440
    e = select(e - 1.0, e, low)
    m = select(m + m - 1.0, m - 1.0, low)
    z = m * m
    p = ((((1.01875663804580931796e-4 * m + 4.97494994976747001425e-1) * m + 4.70579119878881725854) * m + 1.44989225341610930846e1) * m + 1.79368678507819816313e1) * m + 7.70838733755885391666
    q = ((((m + 1.12873587189167450590e1) * m + 4.52279145837532221105e1) * m + 8.29875266912776603211e1) * m + 7.11544750618563894466e1) * m + 2.31251620126765340583e1
    y = m * (z * p / q) - e * 2.121944400546905827679e-4 - 0.5 * z
    r = m + y + e * 0.693359375
    r = select(-inf, r, x == 0.0)
    r = select(nan, r, x < 0.0)
    return select(x, r, (x == inf) | (x != x))
";

pub(super) const POW: &str = concat!(
    "def pow(x: {T}, y: {T}) -> {T}:\n",
    log2_helper!(),
    exp2_helper!(),
    "    r = _exp2(y * _log2(abs(x)))
    whole = round(y) == y
    odd = whole & (round(y * 0.5) != y * 0.5)
    neg = x < 0.0
    r = select(-r, r, neg & odd)
    r = select(nan, r, neg and not whole)
    one = (x == 1.0) | (y == 0.0) | ((x == -1.0) & (abs(y) == inf))
    return select(1.0, r, one)
"
);

pub(super) const POWN: &str = "\
def pown(x: {T}, n: int32) -> {T}:
    r = 1.0
    b = x
    m = n
    if m < 0:
        m = -m
        b = 1.0 / b
    # m is read unsigned, so -2**31 works too
    while m != 0:
        if m & 1:
            r = r * b
        b = b * b
        m = m >> 1
    return r
";

macro_rules! reduce_quadrant {
    () => {
        "    j = round(x * 6.36619772367581343076e-1)
    r = x - j * 1.57079625129699707031 - j * 7.54978941586159635335e-8 - j * 5.39030285815811905290e-15
    q = j - 4.0 * floor(j * 0.25)
    z = r * r
    s = ((((1.58962301576546568060e-10 * z - 2.50507477628578072866e-8) * z + 2.75573136213857245213e-6) * z - 1.98412698295895385996e-4) * z + 8.33333333332211858878e-3) * z - 1.66666666666666307295e-1
    s = r + r * z * s
    c = ((((-1.13585365213876817300e-11 * z + 2.08757008419747316778e-9) * z - 2.75573141792967388112e-7) * z + 2.48015872888517045348e-5) * z - 1.38888888888730564116e-3) * z + 4.16666666666665929218e-2
    c = 1.0 - 0.5 * z + z * z * c
    odd = (q == 1.0) | (q == 3.0)
"
    };
}

pub(super) const SIN: &str = concat!(
    "def sin(x: {T}) -> {T}:\n",
    reduce_quadrant!(),
    "    y = select(c, s, odd)
    return select(-y, y, q >= 2.0)
"
);

pub(super) const COS: &str = concat!(
    "def cos(x: {T}) -> {T}:\n",
    reduce_quadrant!(),
    "    y = select(s, c, odd)
    return select(-y, y, (q == 1.0) | (q == 2.0))
"
);

pub(super) const TAN: &str = concat!(
    "def tan(x: {T}) -> {T}:\n",
    reduce_quadrant!(),
    "    return select(-c / s, s / c, odd)
"
);
