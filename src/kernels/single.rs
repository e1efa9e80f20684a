//! Single-precision sources.
//!
//! The float32 forms are shorter polynomials on the same reductions as
//! the double ones; exponent handling uses the 23-bit mantissa layout.

macro_rules! asin_helper {
    () => {
        "    def _asin(v: {T}) -> {T}:
        a = abs(v)
        z = a * a
        s = a
        if a > 0.5:
            z = 0.5 * (1.0 - a)
            s = sqrt(z)
        p = ((((4.2163199048e-2 * z + 2.4181311049e-2) * z + 4.5470025998e-2) * z + 7.4953002686e-2) * z + 1.6666752422e-1) * z * s + s
        if a > 0.5:
            p = 1.5707963267948966192 - (p + p)
        return select(-p, p, v < 0.0)
"
    };
}

macro_rules! atan_helper {
    () => {
        "    def _atan(v: {T}) -> {T}:
        a = abs(v)
        y = 0.0
        if a > 2.414213562373095:
            y = 1.5707963267948966192
            a = -1.0 / a
        elif a > 0.4142135623730950:
            y = 0.7853981633974483096
            a = (a - 1.0) / (a + 1.0)
        z = a * a
        p = ((8.05374449538e-2 * z - 1.38776856032e-1) * z + 1.99777106478e-1) * z - 3.33329491539e-1
        y = y + (p * z * a + a)
        return select(-y, y, v < 0.0)
"
    };
}

macro_rules! log2_helper {
    () => {
        "    def _log2(v: {T}) -> {T}:
        tiny = v < 1.17549435e-38
        s = select(v * 33554432.0, v, tiny)
        b = as_int(s)
        e = as_float((b >> 23) | 0x4B000000) - 8388608.0 - 126.0
        e = select(e - 25.0, e, tiny)
        m = as_float((b & 0x007FFFFF) | 0x3F000000)
        low = m < 0.707106781186547524
        e = select(e - 1.0, e, low)
        m = select(m + m - 1.0, m - 1.0, low)
        z = m * m
        y = (((((((7.0376836292e-2 * m - 1.1514610310e-1) * m + 1.1676998740e-1) * m - 1.2420140846e-1) * m + 1.4249322787e-1) * m - 1.6668057665e-1) * m + 2.0000714765e-1) * m - 2.4999993993e-1) * m + 3.3333331174e-1
        y = y * m * z - 0.5 * z
        r = y * 0.44269504088896340736 + m * 0.44269504088896340736 + y + m + e
        r = select(-inf, r, v == 0.0)
        return select(v, r, v == inf)
"
    };
}

macro_rules! exp2_helper {
    () => {
        "    def _exp2(w: {T}) -> {T}:
        c = min(max(w, -160.0), 160.0)
        n = round(c)
        f = c - n
        y = (((((1.535336188319500e-4 * f + 1.339887440266574e-3) * f + 9.618437357674640e-3) * f + 5.550332471162809e-2) * f + 2.402264791363012e-1) * f + 6.931472028550421e-1) * f + 1.0
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
    r = 1.5707963267948966192 - t
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
    z = select(1.5707963267948966192, z, (x == 0.0) & (v > 0.0))
    corner = select(2.3561944901923449288, 0.7853981633974483096, x < 0.0)
    z = select(corner, z, (v == inf) & (abs(x) == inf))
    return select(-z, z, neg)
"
);

pub(super) const EXP: &str = "\
def exp(x: {T}) -> {T}:
    c = min(max(x, -110.0), 110.0)
    n = round(c * 1.44269504088896341)
    r = c - n * 0.693359375 + n * 2.12194440e-4
    z = r * r
    y = ((((1.9875691500e-4 * r + 1.3981999507e-3) * r + 8.3334519073e-3) * r + 4.1665795894e-2) * r + 1.6666665459e-1) * r + 5.0000001201e-1
    y = y * z + r + 1.0
    h = floor(n * 0.5)
    y = y * pow2i(h) * pow2i(n - h)
    return select(x, y, x != x)
";

pub(super) const LOG: &str = "\
def log(x: {T}) -> {T}:
    tiny = x < 1.17549435e-38
    v = select(x * 33554432.0, x, tiny)
    b = as_int(v)
    e = as_float((b >> 23) | 0x4B000000) - 8388608.0 - 126.0
    e = select(e - 25.0, e, tiny)
    m = as_float((b & 0x007FFFFF) | 0x3F000000)
    low = m < 0.707106781186547524
    e = select(e - 1.0, e, low)
    m = select(m + m - 1.0, m - 1.0, low)
    z = m * m
    y = (((((((7.0376836292e-2 * m - 1.1514610310e-1) * m + 1.1676998740e-1) * m - 1.2420140846e-1) * m + 1.4249322787e-1) * m - 1.6668057665e-1) * m + 2.0000714765e-1) * m - 2.4999993993e-1) * m + 3.3333331174e-1
    y = y * m * z - e * 2.12194440e-4 - 0.5 * z
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
    while m != 0:
        if m & 1:
            r = r * b
        b = b * b
        m = m >> 1
    return r
";

macro_rules! reduce_quadrant {
    () => {
        "    j = round(x * 0.636619772367581343)
    r = x - j * 1.5703125 - j * 4.837512969970703125e-4 - j * 7.54978995489188216e-8
    q = j - 4.0 * floor(j * 0.25)
    z = r * r
    s = (-1.9515295891e-4 * z + 8.3321608736e-3) * z - 1.6666654611e-1
    s = s * z * r + r
    c = (2.443315711809948e-5 * z - 1.388731625493765e-3) * z + 4.166664568298827e-2
    c = c * z * z - 0.5 * z + 1.0
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
